//! Markdown body preparation and rendering.
//!
//! Before the body reaches the renderer, embeds and images are rewritten
//! to servable media URLs and `[[wikilinks]]` become plain links against
//! the derived wiki map. Rendering itself is pulldown-cmark with the
//! GFM-ish extension set.

use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::media::{self, EMBED_RE, IMAGE_RE};
use crate::wikilink::{normalize_key, normalize_target};

static WIKI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());
static FM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*---\s*\n.*?\n---\s*\n").unwrap());

/// Full body pipeline: strip front-matter, rewrite media URLs, resolve
/// wikilinks, render to HTML.
pub fn render_body(
    markdown: &str,
    base_key: &str,
    prefix: &str,
    media_base: &str,
    wiki: &FxHashMap<String, String>,
) -> String {
    let markdown = normalize_line_endings(markdown);
    let markdown = strip_frontmatter(&markdown);
    let markdown = normalize_images(&markdown, base_key, prefix, media_base);
    let markdown = normalize_wikilinks(&markdown, wiki);
    render_markdown(&markdown)
}

/// Rewrite `![[target|alt]]` embeds and `![alt](target)` images to
/// servable URLs.
pub fn normalize_images(markdown: &str, base_key: &str, prefix: &str, media_base: &str) -> String {
    let pass = EMBED_RE.replace_all(markdown, |caps: &regex::Captures| {
        let inner = caps[1].trim();
        if inner.is_empty() {
            return caps[0].to_string();
        }
        let (target, alt) = media::split_embed(inner);
        let resolved = media::resolve_media_link(&target, base_key, prefix, media_base);
        format!("![{alt}]({resolved})")
    });
    IMAGE_RE
        .replace_all(&pass, |caps: &regex::Captures| {
            let alt = &caps[1];
            let href = caps[2].trim();
            let resolved = media::resolve_media_link(href, base_key, prefix, media_base);
            if resolved == href {
                caps[0].to_string()
            } else {
                format!("![{alt}]({resolved})")
            }
        })
        .into_owned()
}

/// Turn `[[Target|Label#Heading]]` into `[Label](/path#anchor)`.
/// Unresolvable targets degrade to their display text.
pub fn normalize_wikilinks(markdown: &str, wiki: &FxHashMap<String, String>) -> String {
    if wiki.is_empty() {
        return markdown.to_string();
    }
    WIKI_RE
        .replace_all(markdown, |caps: &regex::Captures| {
            let raw = caps[1].trim();
            if raw.is_empty() {
                return caps[0].to_string();
            }
            let (target_part, display) = match raw.split_once('|') {
                Some((target, label)) => (target.trim(), label.trim().to_string()),
                None => (raw, String::new()),
            };
            let (target, heading) = match target_part.split_once('#') {
                Some((t, h)) => (t.trim(), h.trim()),
                None => (target_part, ""),
            };
            let target = normalize_target(target);
            if target.is_empty() {
                return caps[0].to_string();
            }
            let display = if display.is_empty() {
                target.clone()
            } else {
                display
            };
            let Some(path) = wiki.get(&normalize_key(&target)) else {
                return display;
            };
            let mut href = path.clone();
            if !heading.is_empty() {
                let anchor = heading_anchor(heading);
                if !anchor.is_empty() {
                    href = format!("{href}#{anchor}");
                }
            }
            format!("[{display}]({href})")
        })
        .into_owned()
}

/// Slugify a heading into an anchor: lowercase, alphanumerics kept,
/// everything else collapsed to single dashes.
pub fn heading_anchor(heading: &str) -> String {
    let mut out = String::with_capacity(heading.len());
    let mut pending_dash = false;
    for c in heading.to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out
}

pub fn strip_frontmatter(markdown: &str) -> String {
    let stripped = FM_RE.replace(markdown, "");
    stripped.strip_prefix('\n').unwrap_or(&stripped).to_string()
}

pub fn normalize_line_endings(markdown: &str) -> String {
    let markdown = markdown.strip_prefix('\u{feff}').unwrap_or(markdown);
    markdown.replace("\r\n", "\n")
}

/// Markdown to HTML with tables, strikethrough, task lists, footnotes.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);
    out
}
