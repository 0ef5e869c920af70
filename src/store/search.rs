//! Scored substring search over the resolve index.
//!
//! Matching is lowercase `contains` against title, description, path,
//! and any front-matter fields the rules boost. Pagination uses an
//! opaque base64 offset cursor.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::page::{bool_from_meta, value_to_string, ResolveIndex};
use crate::rules::{type_allowed, Rules, SearchFieldsBoost};

const DEFAULT_TITLE_BOOST: f64 = 2.0;
const DEFAULT_DESC_BOOST: f64 = 1.0;
const DEFAULT_BODY_BOOST: f64 = 0.5;
const DEFAULT_FM_BOOST: f64 = 0.5;

/// One searchable document, lowercased fields precomputed at reload.
#[derive(Debug, Clone)]
pub struct SearchDoc {
    path: String,
    title: String,
    description: String,
    updated_at: String,
    kind: String,
    lower_title: String,
    lower_desc: String,
    lower_path: String,
    extras: FxHashMap<String, String>,
}

/// One result row in the search API response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchItem {
    pub title: String,
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub snippet: String,
    pub score: f64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "updatedAt", skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
}

/// Derive search documents from the index, honoring the search filters.
pub fn build_docs(idx: &ResolveIndex, rules: &Rules) -> Vec<SearchDoc> {
    idx.meta
        .iter()
        .filter_map(|(path, meta)| {
            let route = idx.routes.get(path)?;
            if route.status != 200 || route.noindex || bool_from_meta(&meta.fm, "noindex") {
                return None;
            }
            if !type_allowed(&meta.kind, &rules.search.include_types) {
                return None;
            }
            if rules.search.exclude_drafts && bool_from_meta(&meta.fm, "draft") {
                return None;
            }
            let title = meta.title.trim().to_string();
            let description = meta.description.trim().to_string();
            let mut extras = FxHashMap::default();
            for key in rules.search.fields_boost.fm.keys() {
                if let Some(value) = meta.fm.get(key) {
                    extras.insert(key.clone(), value_to_string(value).trim().to_lowercase());
                }
            }
            Some(SearchDoc {
                lower_title: title.to_lowercase(),
                lower_desc: description.to_lowercase(),
                lower_path: path.to_lowercase(),
                title,
                description,
                updated_at: route.last_modified.clone(),
                kind: if meta.kind.is_empty() {
                    "page".to_string()
                } else {
                    meta.kind.clone()
                },
                path: path.clone(),
                extras,
            })
        })
        .collect()
}

/// Score, rank, and paginate. Returns the page and the next cursor
/// (empty when the results are exhausted).
pub fn run(
    docs: &[SearchDoc],
    boost: &SearchFieldsBoost,
    query: &str,
    limit: usize,
    cursor: &str,
) -> (Vec<SearchItem>, String) {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return (Vec::new(), String::new());
    }

    let mut results: Vec<SearchItem> = docs
        .iter()
        .filter_map(|doc| {
            let score = score_query(doc, &q, boost);
            (score > 0.0).then(|| SearchItem {
                title: doc.title.clone(),
                path: doc.path.clone(),
                snippet: doc.description.clone(),
                score,
                kind: doc.kind.clone(),
                updated_at: doc.updated_at.clone(),
            })
        })
        .collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });

    let mut offset = decode_cursor(cursor);
    if offset > results.len() {
        offset = 0;
    }
    let end = (offset + limit).min(results.len());
    let next_cursor = if end < results.len() {
        encode_cursor(end)
    } else {
        String::new()
    };
    (results[offset..end].to_vec(), next_cursor)
}

fn score_query(doc: &SearchDoc, q: &str, boost: &SearchFieldsBoost) -> f64 {
    let title_boost = non_zero(boost.title, DEFAULT_TITLE_BOOST);
    let desc_boost = non_zero(boost.description, DEFAULT_DESC_BOOST);
    let body_boost = non_zero(boost.body, DEFAULT_BODY_BOOST);

    let mut score = 0.0;
    if doc.lower_title.contains(q) {
        score += title_boost;
    }
    if doc.lower_desc.contains(q) {
        score += desc_boost;
    }
    if doc.lower_path.contains(q) {
        score += body_boost;
    }
    for (key, value) in &doc.extras {
        if !value.contains(q) {
            continue;
        }
        score += match boost.fm.get(key) {
            Some(weight) if *weight > 0.0 => *weight,
            _ => DEFAULT_FM_BOOST,
        };
    }
    score
}

fn non_zero(value: f64, fallback: f64) -> f64 {
    if value == 0.0 {
        fallback
    } else {
        value
    }
}

fn encode_cursor(offset: usize) -> String {
    BASE64_STANDARD.encode(offset.to_string())
}

fn decode_cursor(cursor: &str) -> usize {
    if cursor.is_empty() {
        return 0;
    }
    BASE64_STANDARD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| text.parse().ok())
        .unwrap_or(0)
}
