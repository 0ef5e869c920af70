//! Minimal conforming page shell.
//!
//! Produces a complete HTML document around a rendered body: title,
//! description, canonical, robots, Open Graph tags, and JSON-LD. Theme
//! and template selection beyond this shell belong to the presentation
//! layer.

use std::borrow::Cow;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::page::MetaEntry;
use crate::store::SearchItem;

/// Escape text for HTML content and attribute positions.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;"),
    )
}

/// Render a full page around a body fragment.
pub fn render_page(meta: &MetaEntry, body_html: &str, site_title: &str) -> String {
    let title = if meta.title.is_empty() {
        site_title
    } else {
        &meta.title
    };
    let mut head = String::with_capacity(1024);
    head.push_str(&format!("<title>{}</title>\n", escape(title)));
    if !meta.description.is_empty() {
        head.push_str(&format!(
            "<meta name=\"description\" content=\"{}\">\n",
            escape(&meta.description)
        ));
    }
    if !meta.robots.is_empty() {
        head.push_str(&format!(
            "<meta name=\"robots\" content=\"{}\">\n",
            escape(&meta.robots)
        ));
    }
    if !meta.canonical.is_empty() {
        head.push_str(&format!(
            "<link rel=\"canonical\" href=\"{}\">\n",
            escape(&meta.canonical)
        ));
    }
    for (key, value) in &meta.opengraph {
        head.push_str(&format!(
            "<meta property=\"og:{}\" content=\"{}\">\n",
            escape(key),
            escape(value)
        ));
    }
    if let Some(jsonld) = &meta.jsonld {
        if let Ok(raw) = serde_json::to_string(jsonld) {
            head.push_str(&format!(
                "<script type=\"application/ld+json\">{raw}</script>\n"
            ));
        }
    }

    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n{head}</head>\n<body>\n<main>\n{body_html}\n</main>\n</body>\n</html>\n"
    )
}

/// Themed-enough 404 page.
pub fn render_not_found(site_title: &str) -> String {
    let meta = MetaEntry {
        title: format!("Not Found — {site_title}"),
        robots: "noindex, follow".to_string(),
        ..MetaEntry::default()
    };
    render_page(&meta, "<h1>404</h1>\n<p>Page not found.</p>", site_title)
}

/// Server-rendered search results page.
pub fn render_search_page(
    query: &str,
    items: &[SearchItem],
    next_cursor: &str,
    canonical: &str,
    site_title: &str,
) -> String {
    let meta = MetaEntry {
        title: if query.is_empty() {
            "Search".to_string()
        } else {
            format!("Search: {query}")
        },
        canonical: canonical.to_string(),
        robots: "noindex, follow".to_string(),
        ..MetaEntry::default()
    };

    let mut body = String::with_capacity(1024);
    body.push_str("<h1>Search</h1>\n");
    body.push_str(&format!(
        "<form action=\"/search\" method=\"get\"><input type=\"search\" name=\"q\" value=\"{}\"><button type=\"submit\">Search</button></form>\n",
        escape(query)
    ));
    if !items.is_empty() {
        body.push_str("<ul>\n");
        for item in items {
            body.push_str(&format!(
                "<li><a href=\"{}\">{}</a>",
                escape(&item.path),
                escape(&item.title)
            ));
            if !item.snippet.is_empty() {
                body.push_str(&format!(" — {}", escape(&item.snippet)));
            }
            body.push_str("</li>\n");
        }
        body.push_str("</ul>\n");
    } else if !query.is_empty() {
        body.push_str("<p>No results.</p>\n");
    }
    if !next_cursor.is_empty() {
        // Query values go through percent encoding, not HTML escaping;
        // base64 cursors can carry `+` and `=`.
        body.push_str(&format!(
            "<p><a href=\"/search?q={}&amp;cursor={}\">More results</a></p>\n",
            utf8_percent_encode(query, NON_ALPHANUMERIC),
            utf8_percent_encode(next_cursor, NON_ALPHANUMERIC)
        ));
    }
    render_page(&meta, &body, site_title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn test_render_page_head() {
        let meta = MetaEntry {
            title: "Intro".to_string(),
            description: "About things".to_string(),
            canonical: "https://example.com/posts/intro".to_string(),
            robots: "index, follow".to_string(),
            opengraph: [("type".to_string(), "article".to_string())].into(),
            ..MetaEntry::default()
        };
        let html = render_page(&meta, "<p>body</p>", "Site");
        assert!(html.contains("<title>Intro</title>"));
        assert!(html.contains("rel=\"canonical\" href=\"https://example.com/posts/intro\""));
        assert!(html.contains("property=\"og:type\" content=\"article\""));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn test_render_page_falls_back_to_site_title() {
        let html = render_page(&MetaEntry::default(), "", "Fallback");
        assert!(html.contains("<title>Fallback</title>"));
    }

    #[test]
    fn test_not_found_is_noindex() {
        let html = render_not_found("Site");
        assert!(html.contains("noindex, follow"));
        assert!(html.contains("404"));
    }

    #[test]
    fn test_search_page_escapes_query() {
        let html = render_search_page("<script>", &[], "", "https://example.com/search", "Site");
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
