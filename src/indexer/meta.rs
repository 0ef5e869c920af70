//! Metadata derivation: core fields, canonical/robots defaults, Open
//! Graph derivation, and the body excerpt.

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::core::url::join_base_url;
use crate::frontmatter::FmMap;
use crate::media;
use crate::page::{bool_from_meta, map_from_meta, string_from_meta, MetaEntry};
use crate::rules::Rules;

/// Excerpt budget for derived OG descriptions.
const EXCERPT_LIMIT: usize = 180;

/// The four fields every note carries through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CoreFields {
    pub kind: String,
    pub slug: String,
    pub title: String,
    pub description: String,
}

/// Extract core fields, enforcing the rules' required list. `type` is
/// always required; `slug` requirements are handled at permalink time.
pub fn build_core(meta: &FmMap, rules: &Rules) -> Result<CoreFields> {
    let core = CoreFields {
        kind: string_from_meta(meta, "type"),
        slug: string_from_meta(meta, "slug"),
        title: string_from_meta(meta, "title"),
        description: string_from_meta(meta, "description"),
    };
    for field in &rules.fields.required {
        match field.as_str() {
            "slug" => continue,
            "type" => {
                if core.kind.is_empty() {
                    bail!("missing required field type");
                }
            }
            "title" => {
                if core.title.is_empty() {
                    bail!("missing required field title");
                }
            }
            other => {
                if string_from_meta(meta, other).is_empty() {
                    bail!("missing required field {other}");
                }
            }
        }
    }
    if core.kind.is_empty() {
        bail!("missing required field type");
    }
    Ok(core)
}

/// Merge rule defaults into front-matter for keys the author left out.
pub fn apply_fm_defaults(meta: &mut FmMap, defaults: &std::collections::BTreeMap<String, Value>) {
    for (key, value) in defaults {
        meta.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// Derive the full metadata row for one note.
pub fn build_meta_entry(
    meta: &FmMap,
    core: &CoreFields,
    body: &str,
    config: &Config,
    route_path: &str,
    source_key: &str,
) -> MetaEntry {
    let mut canonical = string_from_meta(meta, "canonical");
    if canonical.is_empty() {
        canonical = join_base_url(&config.site.base_url, route_path);
    }
    let mut robots = string_from_meta(meta, "robots");
    if robots.is_empty() {
        robots = if bool_from_meta(meta, "noindex") {
            "noindex, follow".to_string()
        } else {
            "index, follow".to_string()
        };
    }

    let mut og = map_from_meta(meta, "opengraph");
    if og.is_empty() {
        og = map_from_meta(meta, "og");
    }

    let image = derive_image(meta, body, config, source_key);

    // First non-empty wins; explicit og map entries stay untouched.
    if !og.contains_key("title") {
        let title = first_non_empty([
            string_from_meta(meta, "og_title"),
            core.title.clone(),
            config.site.title.clone(),
        ]);
        if !title.is_empty() {
            og.insert("title".to_string(), title);
        }
    }
    if !og.contains_key("description") {
        let description = first_non_empty([
            string_from_meta(meta, "og_description"),
            core.description.clone(),
            body_excerpt(body, EXCERPT_LIMIT),
            config.site.description.clone(),
        ]);
        if !description.is_empty() {
            og.insert("description".to_string(), description);
        }
    }
    og.entry("url".to_string()).or_insert_with(|| canonical.clone());
    if !og.contains_key("type") {
        let og_type = first_non_empty([
            string_from_meta(meta, "og_type"),
            config.og_type_by_type.get(&core.kind).cloned().unwrap_or_default(),
            "website".to_string(),
        ]);
        og.insert("type".to_string(), og_type);
    }
    if !image.is_empty() {
        og.entry("image".to_string()).or_insert_with(|| image.clone());
    }

    MetaEntry {
        kind: core.kind.clone(),
        slug: core.slug.clone(),
        title: core.title.clone(),
        description: core.description.clone(),
        canonical,
        robots,
        opengraph: og,
        jsonld: jsonld_from_meta(meta),
        category: None,
        image,
        fm: meta.clone(),
    }
}

/// Image priority: explicit `og_image`, first body embed/image, then the
/// site default. The result is always an absolute URL.
fn derive_image(meta: &FmMap, body: &str, config: &Config, source_key: &str) -> String {
    let href = first_non_empty([
        string_from_meta(meta, "og_image"),
        media::extract_first_image(body),
        config.site.default_og_image.clone(),
    ]);
    if href.is_empty() {
        return String::new();
    }
    media::resolve_media_absolute(
        &href,
        source_key,
        &config.content.prefix,
        &config.site.media_base_url,
        &config.site.base_url,
    )
}

/// `jsonld` passes through as opaque JSON; a string value is accepted as
/// pre-serialized JSON when it parses, else re-encoded as a JSON string.
fn jsonld_from_meta(meta: &FmMap) -> Option<Value> {
    match meta.get("jsonld")? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            serde_json::from_str(trimmed)
                .ok()
                .or_else(|| Some(Value::String(s.clone())))
        }
        other => Some(other.clone()),
    }
}

fn first_non_empty<const N: usize>(candidates: [String; N]) -> String {
    candidates
        .into_iter()
        .find(|c| !c.trim().is_empty())
        .unwrap_or_default()
}

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").unwrap());
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").unwrap());
static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());
static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static BLOCK_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:#{1,6}\s+|>\s*|[-*+]\s+|\d+\.\s+)").unwrap());

/// Plain-text excerpt of a Markdown body, truncated on a word boundary.
pub fn body_excerpt(body: &str, limit: usize) -> String {
    let text = body.replace("\r\n", "\n");
    let text = FENCE_RE.replace_all(&text, " ");
    let text = media::EMBED_RE.replace_all(&text, |caps: &regex::Captures| {
        let (target, alt) = media::split_embed(caps[1].trim());
        if alt.is_empty() {
            target
        } else {
            alt
        }
    });
    let text = media::IMAGE_RE.replace_all(&text, "$1");
    let text = WIKI_LINK_RE.replace_all(&text, |caps: &regex::Captures| {
        let inner = caps[1].trim();
        match inner.split_once('|') {
            Some((_, label)) => label.trim().to_string(),
            None => inner.to_string(),
        }
    });
    let text = MD_LINK_RE.replace_all(&text, "$1");
    let text = INLINE_CODE_RE.replace_all(&text, "$1");
    let text = HTML_TAG_RE.replace_all(&text, " ");
    let text = BLOCK_MARKER_RE.replace_all(&text, "");

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_on_word(&collapsed, limit)
}

/// Cut at `limit` characters, preferring the last space past half the
/// limit so a word is not split mid-way.
fn truncate_on_word(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > limit / 2 => cut[..idx].trim_end().to_string(),
        _ => cut.trim_end().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fm(value: Value) -> FmMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.site.base_url = "https://example.com".to_string();
        config.site.title = "Example".to_string();
        config
            .og_type_by_type
            .insert("post".to_string(), "article".to_string());
        config
    }

    #[test]
    fn test_build_core_requires_type() {
        let rules = Rules::default();
        assert!(build_core(&fm(json!({"title": "x"})), &rules).is_err());
        let core = build_core(&fm(json!({"type": "post", "slug": "s"})), &rules).unwrap();
        assert_eq!(core.kind, "post");
        assert_eq!(core.slug, "s");
    }

    #[test]
    fn test_build_core_required_fields() {
        let mut rules = Rules::default();
        rules.fields.required = vec!["type".into(), "title".into(), "author".into()];
        let err = build_core(&fm(json!({"type": "post", "title": "T"})), &rules)
            .unwrap_err()
            .to_string();
        assert!(err.contains("author"));
        assert!(build_core(
            &fm(json!({"type": "post", "title": "T", "author": "A"})),
            &rules
        )
        .is_ok());
    }

    #[test]
    fn test_canonical_and_robots_defaults() {
        let meta = fm(json!({"type": "post"}));
        let core = CoreFields {
            kind: "post".into(),
            ..CoreFields::default()
        };
        let entry = build_meta_entry(&meta, &core, "", &config(), "/posts/intro", "notes/intro.md");
        assert_eq!(entry.canonical, "https://example.com/posts/intro");
        assert_eq!(entry.robots, "index, follow");

        let meta = fm(json!({"type": "post", "noindex": true}));
        let entry = build_meta_entry(&meta, &core, "", &config(), "/posts/intro", "notes/intro.md");
        assert_eq!(entry.robots, "noindex, follow");
    }

    #[test]
    fn test_og_derivation_order() {
        let core = CoreFields {
            kind: "post".into(),
            title: "Intro".into(),
            description: "A description".into(),
            ..CoreFields::default()
        };
        let meta = fm(json!({"type": "post"}));
        let entry = build_meta_entry(&meta, &core, "", &config(), "/posts/intro", "notes/intro.md");
        assert_eq!(entry.opengraph["title"], "Intro");
        assert_eq!(entry.opengraph["description"], "A description");
        assert_eq!(entry.opengraph["url"], "https://example.com/posts/intro");
        assert_eq!(entry.opengraph["type"], "article");

        // Explicit og entries win over derived ones.
        let meta = fm(json!({"type": "post", "og": {"title": "Custom"}}));
        let entry = build_meta_entry(&meta, &core, "", &config(), "/posts/intro", "notes/intro.md");
        assert_eq!(entry.opengraph["title"], "Custom");
    }

    #[test]
    fn test_og_description_falls_back_to_excerpt() {
        let core = CoreFields {
            kind: "post".into(),
            ..CoreFields::default()
        };
        let meta = fm(json!({"type": "post"}));
        let entry = build_meta_entry(
            &meta,
            &core,
            "Some body text here.",
            &config(),
            "/p",
            "notes/p.md",
        );
        assert_eq!(entry.opengraph["description"], "Some body text here.");
    }

    #[test]
    fn test_image_from_body_embed() {
        let core = CoreFields {
            kind: "post".into(),
            ..CoreFields::default()
        };
        let meta = fm(json!({"type": "post"}));
        let entry = build_meta_entry(
            &meta,
            &core,
            "![[pics/cat.png|Cat]]",
            &config(),
            "/p",
            "notes/x.md",
        );
        assert_eq!(entry.image, "https://example.com/media/notes/pics/cat.png");
        assert_eq!(entry.opengraph["image"], entry.image);
    }

    #[test]
    fn test_jsonld_passthrough() {
        let meta = fm(json!({"jsonld": {"@type": "Article"}}));
        assert_eq!(
            jsonld_from_meta(&meta).unwrap()["@type"],
            Value::String("Article".into())
        );
        let meta = fm(json!({"jsonld": "{\"@type\":\"Article\"}"}));
        assert_eq!(
            jsonld_from_meta(&meta).unwrap()["@type"],
            Value::String("Article".into())
        );
        let meta = fm(json!({"jsonld": ""}));
        assert!(jsonld_from_meta(&meta).is_none());
    }

    #[test]
    fn test_body_excerpt_strips_markup() {
        let body = "# Heading\n\nSome **bold** text with [a link](https://x) and `code`.\n\n```rust\nfn hidden() {}\n```\n\n> quoted line\n";
        let excerpt = body_excerpt(body, 180);
        assert!(excerpt.contains("a link"));
        assert!(excerpt.contains("code"));
        assert!(!excerpt.contains("hidden"));
        assert!(!excerpt.contains('#'));
        assert!(!excerpt.contains('>'));
    }

    #[test]
    fn test_body_excerpt_embeds_and_wikilinks() {
        let excerpt = body_excerpt("See ![[pics/cat.png|Cat photo]] and [[Other Note|the note]].", 180);
        assert!(excerpt.contains("Cat photo"));
        assert!(excerpt.contains("the note"));
        assert!(!excerpt.contains("[["));
    }

    #[test]
    fn test_excerpt_word_boundary_truncation() {
        let long = "word ".repeat(100);
        let excerpt = body_excerpt(&long, 50);
        assert!(excerpt.chars().count() <= 50);
        assert!(!excerpt.ends_with(' '));
        assert!(excerpt.ends_with("word"));
    }

    #[test]
    fn test_apply_fm_defaults() {
        let mut meta = fm(json!({"draft": true}));
        let mut defaults = std::collections::BTreeMap::new();
        defaults.insert("draft".to_string(), json!(false));
        defaults.insert("lang".to_string(), json!("en"));
        apply_fm_defaults(&mut meta, &defaults);
        assert_eq!(meta["draft"], json!(true));
        assert_eq!(meta["lang"], json!("en"));
    }
}
