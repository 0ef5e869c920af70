//! Route rows and the weak route etag.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// One routable path: where its source lives and how to answer for it.
///
/// Invariants:
/// - `status == 301` iff `redirect_to` is non-empty
/// - `route_etag` is a pure function of the seven identifying inputs, so
///   conditional GETs and cache keys agree across processes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Source object key (kept as `s3_key` in the artifact schema).
    #[serde(rename = "s3_key", default)]
    pub source_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_modified: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub redirect_to: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub noindex: bool,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route_etag: String,
}

/// Weak ETag over a route's identifying inputs.
pub fn route_etag(
    route_path: &str,
    status: u16,
    redirect_to: &str,
    source_key: &str,
    etag: &str,
    last_modified: &str,
    meta_hash: &str,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(route_path.as_bytes());
    hasher.update(status.to_string().as_bytes());
    hasher.update(redirect_to.as_bytes());
    hasher.update(source_key.as_bytes());
    hasher.update(etag.as_bytes());
    hasher.update(last_modified.as_bytes());
    hasher.update(meta_hash.as_bytes());
    format!("W/\"{:x}\"", hasher.finalize())
}
