//! Pluggable content sources.
//!
//! A source enumerates Markdown objects by opaque key and fetches their
//! bytes. Two adapters ship: the local filesystem and an object store
//! behind the [`remote::BlobClient`] collaborator trait.

pub mod local;
pub mod remote;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::{Config, SourceKind};

/// One enumerable blob.
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub key: String,
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
    pub content_type: String,
}

impl Object {
    /// RFC 3339 rendering of the modification time, or empty.
    pub fn last_modified_rfc3339(&self) -> String {
        self.last_modified
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            .unwrap_or_default()
    }
}

/// Contract every content source implements.
///
/// `list` returns only keys ending in `.md` (case-insensitive). `fetch`
/// honors the deadline where the underlying transport can; callers still
/// re-check on return.
pub trait ContentSource: Send + Sync {
    fn list(&self, prefix: &str) -> Result<Vec<Object>>;

    fn fetch(&self, key: &str, deadline: Option<Instant>) -> Result<Vec<u8>>;

    /// Fetch with a byte cap; exceeding the cap is an error, not a
    /// truncation.
    fn fetch_limited(&self, key: &str, cap: u64, deadline: Option<Instant>) -> Result<Vec<u8>> {
        let body = self.fetch(key, deadline)?;
        if body.len() as u64 > cap {
            anyhow::bail!("object {key:?} exceeds {cap} byte limit");
        }
        Ok(body)
    }

    /// Filesystem location of a key, for media pass-through. Local only.
    fn local_path(&self, _key: &str) -> Option<Result<PathBuf>> {
        None
    }

    /// Short-lived fetch URL for a key, for media redirects. Remote only.
    fn presigned_url(&self, _key: &str) -> Option<Result<String>> {
        None
    }
}

/// Build the configured source.
///
/// Remote sources need an object-store client supplied by the embedder;
/// the stock binary only wires the local adapter.
pub fn from_config(
    config: &Config,
    client: Option<Box<dyn remote::BlobClient>>,
) -> Result<Box<dyn ContentSource>> {
    match config.source_kind() {
        SourceKind::Local => Ok(Box::new(local::LocalSource::new(
            config.content.local_dir.clone(),
        ))),
        SourceKind::Remote => {
            let client = client.ok_or_else(|| {
                anyhow::anyhow!("remote content source requires an object-store client")
            })?;
            Ok(Box::new(remote::RemoteSource::new(
                client,
                config.remote.anonymous,
            )))
        }
    }
}
