//! In-memory view of the persisted resolve index.
//!
//! The store reloads `resolve.json` when its mtime advances, deriving the
//! wiki map, search documents, and media allow-list in one swap. Readers
//! take a shared lock just long enough to clone three `Arc`s, so a
//! request observes a consistent triple even while a reload lands. File
//! I/O happens outside the lock.

mod search;

pub use search::SearchItem;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::page::ResolveIndex;
use crate::resolver;
use crate::rules::Rules;
use crate::{debug, log};
use search::SearchDoc;

/// A consistent view handed to one request.
#[derive(Clone)]
pub struct StoreSnapshot {
    pub idx: Arc<ResolveIndex>,
    pub wiki: Arc<FxHashMap<String, String>>,
}

#[derive(Default)]
struct State {
    mtime: Option<SystemTime>,
    idx: Arc<ResolveIndex>,
    wiki: Arc<FxHashMap<String, String>>,
    search: Arc<Vec<SearchDoc>>,
    media: Arc<FxHashSet<String>>,
}

pub struct ResolveStore {
    path: PathBuf,
    rules: Rules,
    allow_all_media: bool,
    state: RwLock<State>,
}

impl ResolveStore {
    pub fn new(path: impl Into<PathBuf>, rules: Rules, allow_all_media: bool) -> Self {
        Self {
            path: path.into(),
            rules,
            allow_all_media,
            state: RwLock::new(State::default()),
        }
    }

    /// Current snapshot, reloading first if the file advanced.
    ///
    /// On any failure (stat, read, parse, expired deadline) the cached
    /// snapshot is returned when one exists; otherwise the error
    /// surfaces.
    pub fn get(&self, deadline: Option<Instant>) -> Result<StoreSnapshot> {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return self.cached_or(anyhow::anyhow!("resolve lookup deadline expired"));
        }
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(err) => return self.cached_or(err.into()),
        };
        let stale = {
            let state = self.state.read();
            state.mtime.map_or(true, |cached| mtime > cached)
        };
        if stale {
            if let Err(err) = self.reload(mtime) {
                log!("serve"; "resolve reload failed: {err}");
                return self.cached_or(err);
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return self.cached_or(anyhow::anyhow!("resolve lookup deadline expired"));
        }
        let state = self.state.read();
        Ok(StoreSnapshot {
            idx: Arc::clone(&state.idx),
            wiki: Arc::clone(&state.wiki),
        })
    }

    /// Is a media key servable? Either the config exposes the whole
    /// prefix or some indexed note references the key.
    pub fn media_allowed(&self, key: &str) -> bool {
        if self.allow_all_media {
            return true;
        }
        // Pick up an index that appeared after startup.
        let _ = self.get(None);
        self.state.read().media.contains(key)
    }

    /// Scored substring search over the derived documents.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        cursor: &str,
        deadline: Option<Instant>,
    ) -> Result<(Vec<SearchItem>, String)> {
        let docs = self.search_docs(deadline)?;
        Ok(search::run(&docs, &self.rules.search.fields_boost, query, limit, cursor))
    }

    fn search_docs(&self, deadline: Option<Instant>) -> Result<Arc<Vec<SearchDoc>>> {
        // Same reload gate as `get`, but the search derivation is what we
        // hand back.
        self.get(deadline)?;
        Ok(Arc::clone(&self.state.read().search))
    }

    fn reload(&self, mtime: SystemTime) -> Result<()> {
        let data = std::fs::read(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let idx: ResolveIndex = serde_json::from_slice(&data).context("parse resolve index")?;

        let (wiki, collisions) = resolver::build_wiki_map(&idx);
        for collision in &collisions {
            log!("serve"; "duplicate wikilink key: {collision}");
        }
        let search = search::build_docs(&idx, &self.rules);
        let media = build_media_allowlist(&idx);
        debug!("serve"; "resolve index loaded: {} routes, {} wiki keys", idx.routes.len(), wiki.len());

        let mut state = self.state.write();
        state.idx = Arc::new(idx);
        state.wiki = Arc::new(wiki);
        state.search = Arc::new(search);
        state.media = Arc::new(media);
        state.mtime = Some(mtime);
        Ok(())
    }

    fn cached_or(&self, err: anyhow::Error) -> Result<StoreSnapshot> {
        let state = self.state.read();
        if state.mtime.is_none() {
            return Err(err);
        }
        Ok(StoreSnapshot {
            idx: Arc::clone(&state.idx),
            wiki: Arc::clone(&state.wiki),
        })
    }
}

fn build_media_allowlist(idx: &ResolveIndex) -> FxHashSet<String> {
    let mut out = FxHashSet::default();
    for keys in idx.media.values() {
        for key in keys {
            let key = key.trim().trim_start_matches('/');
            if !key.is_empty() {
                out.insert(key.to_string());
            }
        }
    }
    out
}
