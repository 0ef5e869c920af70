//! Durable artifact emission.
//!
//! Everything the indexer leaves behind goes through the same atomic
//! path: temp file in the destination directory, write, fsync, rename,
//! fsync the directory. A consumer can never observe a truncated
//! artifact under its final name.

use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collections::build_collections;
use crate::config::RobotsConfig;
use crate::core::url::join_base_url;
use crate::page::{bool_from_meta, ResolveIndex};
use crate::rules::{type_allowed, Rules};

const SITEMAP_INDEX_NAME: &str = "sitemap-index.xml";
const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
const SITEMAP_CHUNK_SIZE: usize = 50_000;

/// Serialize as pretty JSON and write atomically.
pub fn write_atomic_json<T: Serialize>(path: &Path, payload: &T) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(payload)?;
    data.push(b'\n');
    write_atomic(path, &data)
}

/// Write bytes atomically: temp file, fsync, rename, directory fsync.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("rename into {}", path.display()))?;
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}

// ============================================================================
// Sitemaps
// ============================================================================

struct UrlEntry {
    loc: String,
    lastmod: String,
}

/// Write `sitemap-NNNN.xml` chunks and `sitemap-index.xml`, removing
/// chunk files orphaned by a shrinking corpus first.
pub fn write_sitemaps(
    artifacts_dir: &Path,
    base_url: &str,
    idx: &ResolveIndex,
    rules: &Rules,
) -> Result<()> {
    cleanup_sitemap_chunks(artifacts_dir)?;

    let urls: Vec<UrlEntry> = idx
        .routes
        .iter()
        .filter(|(_, route)| route.status == 200 && !route.noindex)
        .filter_map(|(path, route)| {
            let meta = idx.meta.get(path)?;
            if !type_allowed(&meta.kind, &rules.sitemap.include_types) {
                return None;
            }
            if rules.sitemap.exclude_drafts && bool_from_meta(&meta.fm, "draft") {
                return None;
            }
            Some(UrlEntry {
                loc: join_base_url(base_url, path),
                lastmod: lastmod_date(&route.last_modified),
            })
        })
        .collect();

    let chunk_count = urls.len().div_ceil(SITEMAP_CHUNK_SIZE);
    for (i, chunk) in urls.chunks(SITEMAP_CHUNK_SIZE).enumerate() {
        let name = format!("sitemap-{:04}.xml", i + 1);
        write_atomic(&artifacts_dir.join(name), chunk_xml(chunk).as_bytes())?;
    }

    let today = Utc::now().format("%Y-%m-%d").to_string();
    let mut xml = String::with_capacity(1024);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<sitemapindex xmlns=\"{SITEMAP_NS}\">\n"));
    for i in 0..chunk_count {
        let loc = join_base_url(base_url, &format!("/sitemap-{:04}.xml", i + 1));
        xml.push_str("  <sitemap>\n    <loc>");
        xml.push_str(&escape_xml(&loc));
        xml.push_str("</loc>\n    <lastmod>");
        xml.push_str(&today);
        xml.push_str("</lastmod>\n  </sitemap>\n");
    }
    xml.push_str("</sitemapindex>\n");
    write_atomic(&artifacts_dir.join(SITEMAP_INDEX_NAME), xml.as_bytes())
}

fn chunk_xml(urls: &[UrlEntry]) -> String {
    let mut xml = String::with_capacity(4096);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<urlset xmlns=\"{SITEMAP_NS}\">\n"));
    for entry in urls {
        xml.push_str("  <url>\n    <loc>");
        xml.push_str(&escape_xml(&entry.loc));
        xml.push_str("</loc>\n");
        if !entry.lastmod.is_empty() {
            xml.push_str("    <lastmod>");
            xml.push_str(&entry.lastmod);
            xml.push_str("</lastmod>\n");
        }
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

/// `YYYY-MM-DD` of an RFC 3339 timestamp, or empty when unparsable.
fn lastmod_date(last_modified: &str) -> String {
    if last_modified.is_empty() {
        return String::new();
    }
    DateTime::parse_from_rfc3339(last_modified)
        .map(|t| t.with_timezone(&Utc).format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn cleanup_sitemap_chunks(artifacts_dir: &Path) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(artifacts_dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("sitemap-") && name.ends_with(".xml") && name != SITEMAP_INDEX_NAME {
            std::fs::remove_file(entry.path()).ok();
        }
    }
    Ok(())
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;"),
    )
}

// ============================================================================
// robots.txt
// ============================================================================

pub fn write_robots(artifacts_dir: &Path, base_url: &str, cfg: &RobotsConfig) -> Result<()> {
    let mut lines = vec!["User-agent: *".to_string()];
    let disallow: Vec<&str> = cfg
        .disallow
        .iter()
        .map(|rule| rule.trim())
        .filter(|rule| !rule.is_empty())
        .collect();
    if disallow.is_empty() {
        lines.push("Allow: /".to_string());
    } else {
        for rule in disallow {
            lines.push(format!("Disallow: {rule}"));
        }
    }
    lines.push(format!(
        "Sitemap: {}",
        join_base_url(base_url, &format!("/{SITEMAP_INDEX_NAME}"))
    ));
    if !cfg.extra.trim().is_empty() {
        lines.push(String::new());
        lines.push(cfg.extra.trim().to_string());
    }
    let body = format!("{}\n", lines.join("\n"));
    write_atomic(&artifacts_dir.join("robots.txt"), body.as_bytes())
}

// ============================================================================
// search.json
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct SearchIndexItem {
    #[serde(skip_serializing_if = "String::is_empty")]
    title: String,
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    snippet: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    kind: String,
    #[serde(rename = "updatedAt", skip_serializing_if = "String::is_empty")]
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct SearchIndexFile {
    generated_at: String,
    items: Vec<SearchIndexItem>,
}

pub fn write_search_index(artifacts_dir: &Path, idx: &ResolveIndex, rules: &Rules) -> Result<()> {
    let mut items: Vec<SearchIndexItem> = idx
        .meta
        .iter()
        .filter_map(|(path, meta)| {
            let route = idx.routes.get(path)?;
            if route.status != 200 || route.noindex {
                return None;
            }
            if !type_allowed(&meta.kind, &rules.search.include_types) {
                return None;
            }
            if rules.search.exclude_drafts && bool_from_meta(&meta.fm, "draft") {
                return None;
            }
            Some(SearchIndexItem {
                title: meta.title.trim().to_string(),
                path: path.clone(),
                snippet: meta.description.trim().to_string(),
                kind: if meta.kind.is_empty() {
                    "page".to_string()
                } else {
                    meta.kind.clone()
                },
                updated_at: route.last_modified.clone(),
            })
        })
        .collect();
    items.sort_by_key(|item| item.path.to_lowercase());
    let payload = SearchIndexFile {
        generated_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        items,
    };
    write_atomic_json(&artifacts_dir.join("search.json"), &payload)
}

// ============================================================================
// Materialized collections
// ============================================================================

/// Emit each `materialize: true` collection as a standalone JSON file
/// under the artifacts dir. Evaluation runs without a page context.
pub fn materialize_collections(
    artifacts_dir: &Path,
    idx: &ResolveIndex,
    rules: &Rules,
) -> Result<()> {
    let materialized: Vec<&String> = rules
        .collections
        .iter()
        .filter(|(_, rule)| rule.materialize)
        .map(|(name, _)| name)
        .collect();
    if materialized.is_empty() || !rules.artifacts.collections.enabled {
        return Ok(());
    }
    let dir_name = if rules.artifacts.collections.dir.is_empty() {
        "collections"
    } else {
        &rules.artifacts.collections.dir
    };
    let results = build_collections(idx, rules, "");
    for name in materialized {
        if let Some(result) = results.get(name) {
            let path = artifacts_dir.join(dir_name).join(format!("{name}.json"));
            write_atomic_json(&path, result)?;
        }
    }
    Ok(())
}
