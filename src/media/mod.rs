//! Media reference extraction and URL resolution.
//!
//! Bodies reference images two ways: Obsidian embeds `![[target|alt]]`
//! and standard Markdown images `![alt](target)`. Extraction computes the
//! storage key each reference maps to; resolution turns a reference into
//! a servable URL (`/media/<key>`, or an absolute URL against the media
//! base).

use std::sync::LazyLock;

use regex::Regex;

use crate::core::url::{escape_path, is_external};

pub static EMBED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[\[([^\]]+)\]\]").unwrap());
pub static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap());
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(x\d+)?$").unwrap());

/// Split an embed's inner text into (target, alt). The second segment is
/// alt text unless it looks like a dimension spec (`200` or `200x100`).
pub fn split_embed(inner: &str) -> (String, String) {
    let mut segments = inner.splitn(2, '|');
    let target = segments.next().unwrap_or(inner).trim().to_string();
    let alt = segments
        .next()
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty() && !SIZE_RE.is_match(candidate))
        .unwrap_or("")
        .to_string();
    (target, alt)
}

/// Collect the storage keys referenced by a body, sorted and de-duplicated.
pub fn extract_media_keys(markdown: &str, base_key: &str, prefix: &str) -> Vec<String> {
    let markdown = markdown.replace("\r\n", "\n");
    let base_dir = base_dir_of(base_key, prefix);

    let mut keys = std::collections::BTreeSet::new();
    for capture in EMBED_RE.captures_iter(&markdown) {
        let (target, _alt) = split_embed(capture[1].trim());
        if let Some(key) = resolve_media_key(&target, &base_dir, prefix) {
            keys.insert(key);
        }
    }
    for capture in IMAGE_RE.captures_iter(&markdown) {
        if let Some(key) = resolve_media_key(capture[2].trim(), &base_dir, prefix) {
            keys.insert(key);
        }
    }
    keys.into_iter().collect()
}

/// First image reference in a body, if any (embeds win over standard
/// images).
pub fn extract_first_image(markdown: &str) -> String {
    let markdown = markdown.replace("\r\n", "\n");
    if let Some(capture) = EMBED_RE.captures(&markdown) {
        return split_embed(capture[1].trim()).0;
    }
    if let Some(capture) = IMAGE_RE.captures(&markdown) {
        return capture[2].trim().to_string();
    }
    String::new()
}

/// Storage key for a reference, relative to the content prefix.
///
/// `/media/<rel>` passes through as `<rel>`; other absolute paths and
/// external URLs are not media keys; relative references are joined with
/// the note's directory unless they already carry the prefix.
pub fn resolve_media_key(href: &str, base_dir: &str, prefix: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || is_external(href) {
        return None;
    }
    if let Some(rel) = href.strip_prefix("/media/") {
        let key = rel.trim_start_matches('/');
        return (!key.is_empty()).then(|| key.to_string());
    }
    if href.starts_with('/') {
        return None;
    }
    if !prefix.is_empty() && href.starts_with(prefix) {
        let key = href.strip_prefix(prefix).unwrap_or(href).trim_start_matches('/');
        return (!key.is_empty()).then(|| key.to_string());
    }
    let joined = if base_dir.is_empty() {
        href.to_string()
    } else {
        crate::core::url::clean_path(&format!("{base_dir}/{href}"))
    };
    let key = joined.trim_start_matches('/');
    (!key.is_empty()).then(|| key.to_string())
}

/// Rewrite a reference into a servable link: `media_base/<key>` when a
/// media base is configured, else `/media/<key>`. Unresolvable references
/// come back unchanged.
pub fn resolve_media_link(href: &str, base_key: &str, prefix: &str, media_base: &str) -> String {
    let href = href.trim();
    if href.is_empty() || is_external(href) {
        return href.to_string();
    }
    let media_base = media_base.trim_end_matches('/');
    if let Some(rel) = href.strip_prefix("/media/") {
        let key = rel.trim_start_matches('/');
        if media_base.is_empty() || key.is_empty() {
            return href.to_string();
        }
        return format!("{media_base}/{}", escape_path(key));
    }
    if href.starts_with('/') {
        return href.to_string();
    }
    let base_dir = base_dir_of(base_key, prefix);
    let Some(key) = resolve_media_key(href, &base_dir, prefix) else {
        return href.to_string();
    };
    if media_base.is_empty() {
        format!("/media/{}", escape_path(&key))
    } else {
        format!("{media_base}/{}", escape_path(&key))
    }
}

/// Absolute URL for a reference, used for `og:image` and feed payloads.
///
/// Applied in order: external passes through; `/media/<key>` routes via
/// the media base, else the site base; other absolute paths prepend the
/// site base; relative references are joined with the note's directory
/// first.
pub fn resolve_media_absolute(
    href: &str,
    base_key: &str,
    prefix: &str,
    media_base: &str,
    base_url: &str,
) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if is_external(href) {
        return href.to_string();
    }
    let base_url = base_url.trim_end_matches('/');
    let media_base = media_base.trim_end_matches('/');

    if let Some(rel) = href.strip_prefix("/media/") {
        let key = rel.trim_start_matches('/');
        if key.is_empty() {
            return href.to_string();
        }
        if !media_base.is_empty() {
            return format!("{media_base}/{}", escape_path(key));
        }
        if !base_url.is_empty() {
            return format!("{base_url}/media/{}", escape_path(key));
        }
        return format!("/media/{}", escape_path(key));
    }
    if href.starts_with('/') {
        if base_url.is_empty() {
            return href.to_string();
        }
        return format!("{base_url}{href}");
    }

    let base_dir = base_dir_of(base_key, prefix);
    let Some(key) = resolve_media_key(href, &base_dir, prefix) else {
        return String::new();
    };
    if !media_base.is_empty() {
        format!("{media_base}/{}", escape_path(&key))
    } else if !base_url.is_empty() {
        format!("{base_url}/media/{}", escape_path(&key))
    } else {
        format!("/media/{}", escape_path(&key))
    }
}

/// Directory of a key relative to the prefix, or empty at the top level.
fn base_dir_of(base_key: &str, prefix: &str) -> String {
    let key = base_key
        .strip_prefix(prefix)
        .unwrap_or(base_key)
        .trim_start_matches('/');
    match key.rfind('/') {
        Some(idx) => key[..idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_embed_alt_vs_size() {
        assert_eq!(
            split_embed("pics/cat.png|Cat"),
            ("pics/cat.png".into(), "Cat".into())
        );
        assert_eq!(
            split_embed("pics/cat.png|300"),
            ("pics/cat.png".into(), "".into())
        );
        assert_eq!(
            split_embed("pics/cat.png|300x200"),
            ("pics/cat.png".into(), "".into())
        );
        assert_eq!(split_embed("pics/cat.png"), ("pics/cat.png".into(), "".into()));
    }

    #[test]
    fn test_extract_media_keys_relative_to_note() {
        let keys = extract_media_keys("![[pics/cat.png|Cat]]", "notes/x.md", "");
        assert_eq!(keys, vec!["notes/pics/cat.png"]);
    }

    #[test]
    fn test_extract_media_keys_mixed_sorted_deduped() {
        let body = "![[b.png]]\n![alt](a.png)\n![[b.png]]\n![x](https://cdn.example/c.png)";
        let keys = extract_media_keys(body, "notes/x.md", "");
        assert_eq!(keys, vec!["notes/a.png", "notes/b.png"]);
    }

    #[test]
    fn test_media_key_rules() {
        assert_eq!(
            resolve_media_key("/media/pics/cat.png", "notes", ""),
            Some("pics/cat.png".to_string())
        );
        assert_eq!(resolve_media_key("/assets/cat.png", "notes", ""), None);
        assert_eq!(resolve_media_key("https://x/y.png", "notes", ""), None);
        assert_eq!(
            resolve_media_key("notes/pics/cat.png", "sub", "notes/"),
            Some("pics/cat.png".to_string())
        );
    }

    #[test]
    fn test_resolve_media_link() {
        assert_eq!(
            resolve_media_link("pics/cat.png", "notes/x.md", "", ""),
            "/media/notes/pics/cat.png"
        );
        assert_eq!(
            resolve_media_link("pics/cat.png", "notes/x.md", "", "https://media.example.com"),
            "https://media.example.com/notes/pics/cat.png"
        );
        assert_eq!(
            resolve_media_link("https://cdn/x.png", "notes/x.md", "", "https://m"),
            "https://cdn/x.png"
        );
    }

    #[test]
    fn test_resolve_media_absolute() {
        assert_eq!(
            resolve_media_absolute("pics/cat.png", "notes/x.md", "", "", "https://example.com"),
            "https://example.com/media/notes/pics/cat.png"
        );
        assert_eq!(
            resolve_media_absolute("/banner.png", "notes/x.md", "", "", "https://example.com"),
            "https://example.com/banner.png"
        );
        assert_eq!(
            resolve_media_absolute(
                "/media/a b.png",
                "notes/x.md",
                "",
                "https://media.example.com",
                "https://example.com"
            ),
            "https://media.example.com/a%20b.png"
        );
    }

    #[test]
    fn test_extract_first_image_prefers_embed() {
        let body = "text\n![alt](second.png)\n![[first.png]]";
        // Embeds win regardless of position, matching the indexer's
        // image-derivation order.
        assert_eq!(extract_first_image(body), "first.png");
    }
}
