//! Exclusive process lock for indexing runs.
//!
//! Advisory flock on `snapshot_dir/index.lock`. A second indexer
//! observes the held lock and exits busy without touching artifacts.
//! On platforms without advisory locks fs4 degrades to a no-op and the
//! deployment is expected to run a single indexer process.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs4::FileExt;

#[derive(Debug)]
pub struct IndexLock {
    file: File,
    path: PathBuf,
}

/// Try to take the exclusive lock; a held lock is an immediate error.
pub fn acquire(path: &Path) -> Result<IndexLock> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("open lock {}", path.display()))?;
    file.try_lock_exclusive()
        .map_err(|e| anyhow::anyhow!("indexer lock busy: {e}"))?;
    Ok(IndexLock {
        file,
        path: path.to_path_buf(),
    })
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.lock");
        let held = acquire(&path).unwrap();
        let err = acquire(&path).unwrap_err().to_string();
        assert!(err.contains("busy"), "{err}");
        drop(held);
        // Released locks can be re-acquired.
        let _again = acquire(&path).unwrap();
    }

    #[test]
    fn test_lock_file_removed_on_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.lock");
        drop(acquire(&path).unwrap());
        assert!(!path.exists());
    }
}
