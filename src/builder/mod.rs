//! Static site reproduction.
//!
//! Rebuilds the whole site into a dist directory from the resolve index:
//! rendered pages at `<route>/index.html`, redirect stubs for 301 rows,
//! fresh sitemap/robots/search artifacts, and a 404 page. The dist dir
//! is cleanly rewritten every run so nothing stale survives a shrinking
//! corpus.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::artifacts;
use crate::config::Config;
use crate::core::url::{is_external, join_base_url};
use crate::indexer;
use crate::log;
use crate::page::{MetaEntry, ResolveIndex};
use crate::resolver;
use crate::rules::Rules;
use crate::server::{markdown, page};
use crate::source::ContentSource;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub dist_dir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    /// Refuse to index when resolve.json is missing.
    pub no_index: bool,
    pub generate_search: bool,
}

pub fn build(
    config: &Config,
    rules: &Rules,
    source: &dyn ContentSource,
    opts: &BuildOptions,
) -> Result<()> {
    let rules_dir = Path::new(&config.rules_path)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let artifacts_dir = opts
        .artifacts_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.paths.artifacts_dir));
    let dist_dir = opts
        .dist_dir
        .clone()
        .unwrap_or_else(|| rules_dir.join("dist"));

    let resolve_path = artifacts_dir.join("resolve.json");
    if !resolve_path.exists() {
        if opts.no_index {
            bail!(
                "resolve.json missing and --no-index set: {}",
                resolve_path.display()
            );
        }
        let mut index_config = config.clone();
        index_config.paths.artifacts_dir = artifacts_dir.to_string_lossy().into_owned();
        indexer::run(&index_config, source).context("index before build")?;
    }
    let idx = indexer::load_resolve(&resolve_path)
        .with_context(|| format!("read resolve {}", resolve_path.display()))?;

    reset_dir(&dist_dir)?;
    write_dist_artifacts(&dist_dir, &idx, config, rules, opts.generate_search)?;

    let (wiki, collisions) = resolver::build_wiki_map(&idx);
    for collision in &collisions {
        log!("build"; "duplicate wikilink key: {collision}");
    }

    let mut rendered = 0usize;
    for (route_path, route) in &idx.routes {
        let Some(meta) = idx.meta.get(route_path) else {
            continue;
        };
        let out_path = output_path(&dist_dir, route_path);
        if route.status == 301 && !route.redirect_to.is_empty() {
            write_redirect_page(&out_path, &config.site.base_url, &route.redirect_to)?;
            continue;
        }
        if route.status != 200 || route.source_key.is_empty() {
            continue;
        }

        let body = source
            .fetch(&route.source_key, None)
            .with_context(|| format!("fetch {}", route.source_key))?;
        let text = String::from_utf8_lossy(&body);
        let body_html = markdown::render_body(
            &text,
            &route.source_key,
            &config.content.prefix,
            &config.site.media_base_url,
            &wiki,
        );
        let meta = rewrite_meta_media_urls(meta.clone(), &config.site.media_base_url);
        let html = page::render_page(&meta, &body_html, &config.site.title);
        write_file(&out_path, html.as_bytes())?;
        rendered += 1;
    }

    write_file(
        &dist_dir.join("404.html"),
        page::render_not_found(&config.site.title).as_bytes(),
    )?;
    log!("build"; "wrote {rendered} pages to {}", dist_dir.display());
    Ok(())
}

/// Sitemaps, robots, and search are regenerated straight into dist; the
/// sitemap index is also exposed as `sitemap.xml` for crawlers probing
/// the conventional name.
fn write_dist_artifacts(
    dist_dir: &Path,
    idx: &ResolveIndex,
    config: &Config,
    rules: &Rules,
    generate_search: bool,
) -> Result<()> {
    artifacts::write_sitemaps(dist_dir, &config.site.base_url, idx, rules)?;
    std::fs::copy(
        dist_dir.join("sitemap-index.xml"),
        dist_dir.join("sitemap.xml"),
    )?;
    artifacts::write_robots(dist_dir, &config.site.base_url, &config.robots)?;
    if generate_search {
        artifacts::write_search_index(dist_dir, idx, rules)?;
    }
    Ok(())
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("clean dist dir {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// `/` maps to `index.html`, everything else to `<path>/index.html`.
fn output_path(dist_dir: &Path, route_path: &str) -> PathBuf {
    let clean = crate::core::url::clean_path(&format!("/{}", route_path.trim()));
    if clean == "/" {
        return dist_dir.join("index.html");
    }
    dist_dir
        .join(clean.trim_start_matches('/'))
        .join("index.html")
}

fn write_redirect_page(out_path: &Path, base_url: &str, target: &str) -> Result<()> {
    let absolute = if is_external(target) {
        target.to_string()
    } else {
        join_base_url(base_url, target)
    };
    let escaped = page::escape(&absolute).into_owned();
    let html = format!(
        "<!doctype html>\n<html lang=\"en\">\n  <head>\n    <meta charset=\"utf-8\">\n    <meta http-equiv=\"refresh\" content=\"0; url={escaped}\">\n    <link rel=\"canonical\" href=\"{escaped}\">\n    <title>Redirecting…</title>\n  </head>\n  <body>\n    <p>Redirecting to <a href=\"{escaped}\">{escaped}</a></p>\n  </body>\n</html>\n"
    );
    write_file(out_path, html.as_bytes())
}

/// Rewrite meta image URLs against the media base for static hosting.
fn rewrite_meta_media_urls(mut meta: MetaEntry, media_base: &str) -> MetaEntry {
    if media_base.is_empty() {
        return meta;
    }
    let base = media_base.trim_end_matches('/');
    let rewrite = |value: &str| -> String {
        if value.is_empty() || is_external(value) {
            return value.to_string();
        }
        if let Some(key) = value.strip_prefix("/media/") {
            let key = key.trim_start_matches('/');
            if key.is_empty() {
                return value.to_string();
            }
            return format!("{base}/{}", crate::core::url::escape_path(key));
        }
        value.to_string()
    };
    meta.image = rewrite(&meta.image);
    for (key, value) in meta.opengraph.clone() {
        if key.eq_ignore_ascii_case("image") {
            meta.opengraph.insert(key, rewrite(&value));
        }
    }
    meta
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))
}
