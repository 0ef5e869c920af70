//! Content-addressed HTML cache.
//!
//! One file per `(site, theme+schema, route, route_etag)`, path
//! components hex-encoded so arbitrary route paths stay filesystem-safe.
//! An exact etag match is a `hit`; when the etag generation is gone, the
//! newest file for the same route serves as `stale`. Records are never
//! mutated, only superseded, so plain writes suffice: later readers
//! always accept the latest file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Bumped when the record layout or rendering pipeline changes shape.
const CACHE_SCHEMA_VERSION: &str = "v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    html: String,
    route_etag: String,
    stored_at: String,
}

/// How a cache read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Stale,
}

pub struct HtmlCache {
    root: PathBuf,
    theme: String,
}

impl HtmlCache {
    pub fn new(root: impl Into<PathBuf>, theme: &str) -> Self {
        Self {
            root: root.into(),
            theme: format!("{theme}-{CACHE_SCHEMA_VERSION}"),
        }
    }

    fn dir(&self, site_id: &str) -> PathBuf {
        self.root
            .join("html")
            .join(hex::encode(site_id))
            .join(hex::encode(&self.theme))
    }

    fn file(&self, site_id: &str, route_path: &str, route_etag: &str) -> PathBuf {
        self.dir(site_id)
            .join(format!(
                "{}-{}.json",
                hex::encode(route_path),
                hex::encode(route_etag)
            ))
    }

    /// Read the cached HTML for a route.
    ///
    /// A non-empty `route_etag` is tried exactly first. Failing that, the
    /// newest record for the route (any etag) is returned as stale.
    pub fn read(
        &self,
        site_id: &str,
        route_path: &str,
        route_etag: &str,
    ) -> Result<(String, CacheOutcome)> {
        if !route_etag.is_empty() {
            let path = self.file(site_id, route_path, route_etag);
            if let Ok(bytes) = std::fs::read(&path) {
                if let Ok(record) = serde_json::from_slice::<CacheRecord>(&bytes) {
                    return Ok((record.html, CacheOutcome::Hit));
                }
            }
        }

        let dir = self.dir(site_id);
        let prefix = format!("{}-", hex::encode(route_path));
        let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("read cache dir {}", dir.display()))?
            .flatten()
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
                latest = Some((modified, entry.path()));
            }
        }
        let (_, path) = latest.context("no cached record")?;
        let bytes = std::fs::read(&path)?;
        let record: CacheRecord = serde_json::from_slice(&bytes).context("parse cache record")?;
        Ok((record.html, CacheOutcome::Stale))
    }

    /// Store the rendered HTML for a route generation. Idempotent per
    /// `route_etag`.
    pub fn write(&self, site_id: &str, route_path: &str, route_etag: &str, html: &str) -> Result<()> {
        let record = CacheRecord {
            html: html.to_string(),
            route_etag: route_etag.to_string(),
            stored_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        };
        let path = self.file(site_id, route_path, route_etag);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec(&record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &Path) -> HtmlCache {
        HtmlCache::new(dir, "seo-minimal")
    }

    #[test]
    fn test_exact_match_is_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.write("site", "/posts/intro", "W/\"abc\"", "<p>hi</p>").unwrap();
        let (html, outcome) = cache.read("site", "/posts/intro", "W/\"abc\"").unwrap();
        assert_eq!(html, "<p>hi</p>");
        assert_eq!(outcome, CacheOutcome::Hit);
    }

    #[test]
    fn test_prefix_match_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.write("site", "/posts/intro", "W/\"old\"", "<p>old</p>").unwrap();
        let (html, outcome) = cache.read("site", "/posts/intro", "W/\"new\"").unwrap();
        assert_eq!(html, "<p>old</p>");
        assert_eq!(outcome, CacheOutcome::Stale);
    }

    #[test]
    fn test_missing_route_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        assert!(cache.read("site", "/unknown", "").is_err());
        cache.write("site", "/posts/intro", "W/\"abc\"", "x").unwrap();
        assert!(cache.read("site", "/unknown", "").is_err());
    }

    #[test]
    fn test_distinct_etags_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let a = cache.file("site", "/p", "W/\"a\"");
        let b = cache.file("site", "/p", "W/\"b\"");
        assert_ne!(a, b);
    }

    #[test]
    fn test_site_partition() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.write("site-a", "/p", "W/\"e\"", "a").unwrap();
        assert!(cache.read("site-b", "/p", "W/\"e\"").is_err());
    }

    #[test]
    fn test_write_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.write("site", "/p", "W/\"e\"", "first").unwrap();
        cache.write("site", "/p", "W/\"e\"", "second").unwrap();
        let (html, _) = cache.read("site", "/p", "W/\"e\"").unwrap();
        assert_eq!(html, "second");
    }
}
