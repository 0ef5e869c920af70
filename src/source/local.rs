//! Local filesystem source adapter.
//!
//! Etags are the hex SHA-1 of file contents, so a rename of identical
//! bytes does not invalidate incremental reuse. Keys are `/`-separated
//! paths relative to the content root; anything that would escape the
//! root after normalization is rejected.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};
use walkdir::WalkDir;

use super::{ContentSource, Object};
use crate::core::url::clean_path;

pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to an on-disk path, refusing traversal out of the
    /// root via `..` or absolute components.
    pub fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            bail!("invalid local key: empty");
        }
        let clean = clean_path(&format!("/{key}"));
        if clean == "/" || clean.split('/').any(|seg| seg == "..") {
            bail!("invalid local key: {key:?}");
        }
        let rel = clean.trim_start_matches('/');
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("content root {}", self.root.display()))?;
        let full = root.join(rel);
        if !full.starts_with(&root) {
            bail!("invalid local key: {key:?}");
        }
        Ok(full)
    }
}

impl ContentSource for LocalSource {
    fn list(&self, prefix: &str) -> Result<Vec<Object>> {
        let prefix = normalize_prefix(prefix);
        let list_root = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&prefix)
        };
        if !list_root.is_dir() {
            bail!("content root is not a directory: {}", list_root.display());
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&list_root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if !name.ends_with(".md") {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&list_root)
                .unwrap_or(entry.path());
            let mut key = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            if key.is_empty() {
                continue;
            }
            if !prefix.is_empty() {
                key = format!("{prefix}{key}");
            }
            let metadata = entry.metadata()?;
            let modified: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            out.push(Object {
                etag: file_etag(entry.path())?,
                last_modified: Some(modified),
                size: metadata.len(),
                content_type: String::new(),
                key,
            });
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn fetch(&self, key: &str, _deadline: Option<Instant>) -> Result<Vec<u8>> {
        let path = self.resolve_path(key)?;
        std::fs::read(&path).with_context(|| format!("read {}", path.display()))
    }

    fn fetch_limited(&self, key: &str, cap: u64, _deadline: Option<Instant>) -> Result<Vec<u8>> {
        let path = self.resolve_path(key)?;
        let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let mut body = Vec::new();
        file.take(cap + 1).read_to_end(&mut body)?;
        if body.len() as u64 > cap {
            bail!("object {key:?} exceeds {cap} byte limit");
        }
        Ok(body)
    }

    fn local_path(&self, key: &str) -> Option<Result<PathBuf>> {
        Some(self.resolve_path(key))
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.trim_start_matches('/');
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Hex SHA-1 of file contents, streamed.
fn file_etag(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, LocalSource) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes/nested")).unwrap();
        fs::write(dir.path().join("notes/intro.md"), "# Intro\n").unwrap();
        fs::write(dir.path().join("notes/nested/deep.MD"), "# Deep\n").unwrap();
        fs::write(dir.path().join("notes/image.png"), [0u8; 4]).unwrap();
        let source = LocalSource::new(dir.path());
        (dir, source)
    }

    #[test]
    fn test_list_only_markdown_sorted() {
        let (_dir, source) = fixture();
        let objects = source.list("").unwrap();
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["notes/intro.md", "notes/nested/deep.MD"]);
        assert!(objects.iter().all(|o| o.last_modified.is_some()));
    }

    #[test]
    fn test_list_with_prefix() {
        let (_dir, source) = fixture();
        let objects = source.list("notes/nested").unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "notes/nested/deep.MD");
    }

    #[test]
    fn test_etag_tracks_content_not_name() {
        let (dir, source) = fixture();
        let before = source.list("").unwrap();
        fs::rename(
            dir.path().join("notes/intro.md"),
            dir.path().join("notes/renamed.md"),
        )
        .unwrap();
        let after = source.list("").unwrap();
        let old = before.iter().find(|o| o.key.ends_with("intro.md")).unwrap();
        let new = after.iter().find(|o| o.key.ends_with("renamed.md")).unwrap();
        assert_eq!(old.etag, new.etag);
    }

    #[test]
    fn test_fetch_and_cap() {
        let (_dir, source) = fixture();
        let body = source.fetch("notes/intro.md", None).unwrap();
        assert_eq!(body, b"# Intro\n");
        assert!(source.fetch_limited("notes/intro.md", 8, None).is_ok());
        assert!(source.fetch_limited("notes/intro.md", 7, None).is_err());
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, source) = fixture();
        assert!(source.fetch("../etc/passwd", None).is_err());
        assert!(source.fetch("notes/../../etc/passwd", None).is_err());
        assert!(source.fetch("", None).is_err());
    }
}
