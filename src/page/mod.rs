//! Resolve index data model.
//!
//! Everything the indexer persists and the server reads back: route rows,
//! page metadata, raw link targets, resolved links, and media references.
//! Maps are `BTreeMap` so serialized artifacts are byte-stable across runs
//! (modulo `generated_at`).

mod fm;
mod meta;
mod route;

pub use fm::{bool_from_meta, list_from_meta, map_from_meta, string_from_meta, value_to_string};
pub use meta::{CategoryModel, MetaEntry};
pub use route::{route_etag, RouteEntry};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frontmatter::FmMap;

/// Per-key source state captured at the end of a successful indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub etag: String,
    pub last_modified: String,
}

/// `key -> snapshot` persisted between runs; drives incremental reuse.
pub type Snapshot = BTreeMap<String, SnapshotEntry>;

/// `path -> link name -> targets` (raw or resolved, depending on the map).
pub type LinkTable = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// The durable output of an indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveIndex {
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub routes: BTreeMap<String, RouteEntry>,
    #[serde(default)]
    pub meta: BTreeMap<String, MetaEntry>,
    /// Resolved cross-links; values are route paths.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: LinkTable,
    /// Raw link targets as written in the source, grouped by rule name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub link_targets: LinkTable,
    /// Media keys referenced by each path, sorted and de-duplicated.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub media: BTreeMap<String, Vec<String>>,
}

/// One evaluated collection: flat items or grouped buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<CollectionItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<CollectionGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionGroup {
    pub key: String,
    pub items: Vec<CollectionItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionItem {
    pub path: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub canonical: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
    #[serde(default)]
    pub noindex: bool,
    #[serde(default, skip_serializing_if = "FmMap::is_empty")]
    pub fm: FmMap,
}

impl ResolveIndex {
    /// Snapshot an item view of a path for collection evaluation.
    pub fn collection_item(&self, path: &str) -> CollectionItem {
        let meta = self.meta.get(path).cloned().unwrap_or_default();
        let route = self.routes.get(path).cloned().unwrap_or_default();
        CollectionItem {
            path: path.to_string(),
            kind: meta.kind,
            slug: meta.slug,
            title: meta.title,
            description: meta.description,
            canonical: meta.canonical,
            image: meta.image,
            updated_at: route.last_modified,
            noindex: route.noindex,
            fm: meta.fm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_index_round_trip() {
        let mut idx = ResolveIndex::default();
        idx.routes.insert(
            "/posts/intro".to_string(),
            RouteEntry {
                source_key: "notes/intro.md".to_string(),
                etag: "abc".to_string(),
                status: 200,
                ..RouteEntry::default()
            },
        );
        idx.meta.insert(
            "/posts/intro".to_string(),
            MetaEntry {
                kind: "post".to_string(),
                slug: "intro".to_string(),
                ..MetaEntry::default()
            },
        );
        let json = serde_json::to_string(&idx).unwrap();
        assert!(json.contains("\"s3_key\":\"notes/intro.md\""));
        assert!(json.contains("\"type\":\"post\""));
        let back: ResolveIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back.routes["/posts/intro"].source_key, "notes/intro.md");
        assert_eq!(back.meta["/posts/intro"].kind, "post");
    }

    #[test]
    fn test_empty_sections_omitted() {
        let idx = ResolveIndex::default();
        let json = serde_json::to_string(&idx).unwrap();
        assert!(!json.contains("links"));
        assert!(!json.contains("media"));
    }
}
