//! Request dispatch and the page path.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tiny_http::{Header, Request};

use super::cache::{CacheOutcome, HtmlCache};
use super::markdown;
use super::page;
use super::response::{self, header, is_safe_asset, is_safe_key, mime};
use crate::config::Config;
use crate::core::metrics;
use crate::core::url::join_base_url;
use crate::log;
use crate::page::RouteEntry;
use crate::source::ContentSource;
use crate::store::{ResolveStore, StoreSnapshot};

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);
const FETCH_TIMEOUT: Duration = Duration::from_secs(8);
/// Bodies past this size are refused rather than truncated.
const MAX_MARKDOWN: u64 = 5 * 1024 * 1024;

/// Everything a worker needs to answer one request.
pub struct App {
    pub config: Config,
    pub store: ResolveStore,
    pub cache: HtmlCache,
    pub source: Box<dyn ContentSource>,
}

pub fn handle(app: &App, request: Request) -> Result<()> {
    metrics::inc(metrics::REQUESTS_TOTAL);
    if crate::core::is_shutdown() {
        let status = response::send_text(request, 503, "503 Service Unavailable")?;
        metrics::track_status(status);
        return Ok(());
    }

    let raw_url = request.url().to_string();
    let path = decode_path(raw_url.split('?').next().unwrap_or("/"));
    let artifacts_dir = Path::new(&app.config.paths.artifacts_dir);

    let status = if path == "/health" {
        response::send_text(request, 200, "ok")?
    } else if path == "/metrics" {
        response::send(
            request,
            200,
            mime::JSON,
            metrics::render_json().into_bytes(),
            Vec::new(),
        )?
    } else if path == "/robots.txt" {
        response::serve_file(request, &artifacts_dir.join("robots.txt"), mime::PLAIN)?
    } else if path.starts_with("/sitemap") {
        let name = path.rsplit('/').next().unwrap_or("");
        let name = if name.starts_with("sitemap") {
            name.to_string()
        } else {
            "sitemap-index.xml".to_string()
        };
        response::serve_file(request, &artifacts_dir.join(name), mime::XML)?
    } else if let Some(name) = path.strip_prefix("/assets/") {
        serve_asset(app, request, name)?
    } else if let Some(key) = path.strip_prefix("/media/") {
        serve_media(app, request, key)?
    } else if path.starts_with("/v1/search") {
        serve_search_api(app, request, &raw_url)?
    } else if path == "/search" {
        serve_search_page(app, request, &raw_url)?
    } else if path == "/favicon.ico" {
        serve_asset(app, request, "favicon.ico")?
    } else {
        serve_page(app, request, &path)?
    };
    metrics::track_status(status);
    Ok(())
}

// ============================================================================
// Pages
// ============================================================================

fn serve_page(app: &App, request: Request, path: &str) -> Result<u16> {
    if !host_allowed(app, &request) {
        return not_found(app, request);
    }
    let path = if path.is_empty() { "/" } else { path };

    let deadline = Instant::now() + RESOLVE_TIMEOUT;
    let Ok(snapshot) = app.store.get(Some(deadline)) else {
        return stale_or_unavailable(app, request, path);
    };
    let Some(route) = snapshot.idx.routes.get(path).cloned() else {
        return not_found(app, request);
    };
    if route.status == 301 && !route.redirect_to.is_empty() {
        return response::send_empty(
            request,
            301,
            vec![header("Location", &route.redirect_to)],
        );
    }
    if route.status != 200 {
        return not_found(app, request);
    }

    if let Some(inm) = request_header(&request, "If-None-Match") {
        if !route.route_etag.is_empty() && inm == route.route_etag {
            metrics::inc(metrics::CACHE_HIT);
            return response::send_empty(request, 304, page_headers(app, &route, "hit", false));
        }
    }

    let site_id = &app.config.site.id;
    if let Ok((body_html, CacheOutcome::Hit)) = app.cache.read(site_id, path, &route.route_etag) {
        metrics::inc(metrics::CACHE_HIT);
        return respond_page(app, request, path, &snapshot, &route, &body_html, "hit");
    }

    if route.source_key.is_empty() {
        return stale_or_unavailable(app, request, path);
    }
    let fetch_deadline = Instant::now() + FETCH_TIMEOUT;
    let Ok(markdown_bytes) =
        app.source
            .fetch_limited(&route.source_key, MAX_MARKDOWN, Some(fetch_deadline))
    else {
        return stale_or_unavailable(app, request, path);
    };
    let markdown_text = String::from_utf8_lossy(&markdown_bytes);
    // Serve-mode media stays on the local `/media/` route; the media base
    // only applies to static builds.
    let body_html = markdown::render_body(
        &markdown_text,
        &route.source_key,
        &app.config.content.prefix,
        "",
        &snapshot.wiki,
    );
    if let Err(err) = app.cache.write(site_id, path, &route.route_etag, &body_html) {
        log!("serve"; "cache write failed for {path}: {err}");
    }
    metrics::inc(metrics::CACHE_MISS);
    respond_page(app, request, path, &snapshot, &route, &body_html, "miss")
}

fn respond_page(
    app: &App,
    request: Request,
    path: &str,
    snapshot: &StoreSnapshot,
    route: &RouteEntry,
    body_html: &str,
    cache_status: &str,
) -> Result<u16> {
    let meta = snapshot.idx.meta.get(path).cloned().unwrap_or_default();
    let html = page::render_page(&meta, body_html, &app.config.site.title);
    response::send_html(request, 200, html, page_headers(app, route, cache_status, false))
}

fn page_headers(app: &App, route: &RouteEntry, cache_status: &str, stale: bool) -> Vec<Header> {
    let mut headers = vec![
        header(
            "Cache-Control",
            &format!(
                "public, s-maxage={}, stale-if-error={}",
                app.config.cache.html_ttl_seconds, app.config.cache.stale_if_error_seconds
            ),
        ),
        header("X-Notepub-Cache", cache_status),
    ];
    if !route.route_etag.is_empty() {
        headers.push(header("ETag", &route.route_etag));
    }
    if stale {
        headers.push(header("X-Index-Stale", "true"));
        headers.push(header("Warning", "110 - Response is stale"));
    }
    headers
}

/// Downstream failed: serve the newest cached record for the route with
/// stale markers, else 503 with a retry hint.
fn stale_or_unavailable(app: &App, request: Request, path: &str) -> Result<u16> {
    if let Ok((body_html, _)) = app.cache.read(&app.config.site.id, path, "") {
        if !body_html.is_empty() {
            metrics::inc(metrics::CACHE_STALE);
            let headers = vec![
                header("X-Notepub-Cache", "stale"),
                header("X-Index-Stale", "true"),
                header("Warning", "110 - Response is stale"),
            ];
            return response::send(request, 200, mime::HTML, body_html.into_bytes(), headers);
        }
    }
    response::send(
        request,
        503,
        mime::PLAIN,
        b"Index temporarily unavailable".to_vec(),
        vec![header("Retry-After", "60")],
    )
}

fn not_found(app: &App, request: Request) -> Result<u16> {
    let html = page::render_not_found(&app.config.site.title);
    response::send_html(request, 404, html, Vec::new())
}

// ============================================================================
// Media
// ============================================================================

fn serve_media(app: &App, request: Request, raw_key: &str) -> Result<u16> {
    let key = raw_key.trim_start_matches('/');
    if !is_safe_key(key) {
        return not_found(app, request);
    }
    let prefix = &app.config.content.prefix;
    let allow_key = key.strip_prefix(prefix.as_str()).unwrap_or(key);
    let allow_key = allow_key.trim_start_matches('/');
    if !app.store.media_allowed(allow_key) {
        return not_found(app, request);
    }

    let full_key = if !prefix.is_empty() && !key.starts_with(prefix.as_str()) {
        format!("{prefix}{key}")
    } else {
        key.to_string()
    };

    if let Some(resolved) = app.source.local_path(&full_key) {
        return match resolved {
            Ok(path) => response::serve_file(request, &path, ""),
            Err(_) => not_found(app, request),
        };
    }
    if let Some(presigned) = app.source.presigned_url(&full_key) {
        return match presigned {
            Ok(url) => response::send_empty(request, 307, vec![header("Location", &url)]),
            Err(_) => not_found(app, request),
        };
    }
    let deadline = Instant::now() + FETCH_TIMEOUT;
    match app.source.fetch(&full_key, Some(deadline)) {
        Ok(body) => {
            let guessed = Path::new(&full_key);
            response::serve_bytes(request, guessed, body)
        }
        Err(_) => not_found(app, request),
    }
}

// ============================================================================
// Search
// ============================================================================

fn serve_search_api(app: &App, request: Request, raw_url: &str) -> Result<u16> {
    let params = query_params(raw_url);
    let q = params.get("q").map(|s| s.trim()).unwrap_or("");
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| (1..=50).contains(v))
        .unwrap_or(8);
    let cursor = params.get("cursor").cloned().unwrap_or_default();

    if q.len() < 2 {
        return response::send_json(
            request,
            200,
            &serde_json::json!({"items": [], "next_cursor": ""}),
        );
    }
    let deadline = Instant::now() + RESOLVE_TIMEOUT;
    match app.store.search(q, limit, &cursor, Some(deadline)) {
        Ok((items, next_cursor)) => response::send_json(
            request,
            200,
            &serde_json::json!({"items": items, "next_cursor": next_cursor}),
        ),
        Err(_) => response::send(
            request,
            503,
            mime::PLAIN,
            b"search unavailable".to_vec(),
            Vec::new(),
        ),
    }
}

fn serve_search_page(app: &App, request: Request, raw_url: &str) -> Result<u16> {
    if !host_allowed(app, &request) {
        return not_found(app, request);
    }
    let params = query_params(raw_url);
    let q = params.get("q").map(|s| s.trim()).unwrap_or("").to_string();
    let cursor = params.get("cursor").cloned().unwrap_or_default();

    let mut items = Vec::new();
    let mut next_cursor = String::new();
    if q.len() >= 2 {
        let deadline = Instant::now() + RESOLVE_TIMEOUT;
        if let Ok((found, next)) = app.store.search(&q, 10, &cursor, Some(deadline)) {
            items = found;
            next_cursor = next;
        }
    }
    let canonical = search_canonical(&app.config.site.base_url, &q, &cursor);
    let html = page::render_search_page(&q, &items, &next_cursor, &canonical, &app.config.site.title);
    response::send_html(request, 200, html, Vec::new())
}

fn search_canonical(base_url: &str, q: &str, cursor: &str) -> String {
    let base = join_base_url(base_url, "/search");
    if q.is_empty() {
        return base;
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("q", q);
    if !cursor.is_empty() {
        serializer.append_pair("cursor", cursor);
    }
    format!("{base}?{}", serializer.finish())
}

// ============================================================================
// Assets and helpers
// ============================================================================

fn serve_asset(app: &App, request: Request, name: &str) -> Result<u16> {
    if !is_safe_asset(name) {
        return response::send_text(request, 404, "404 Not Found");
    }
    let path = Path::new(&app.config.theme.dir)
        .join(&app.config.theme.name)
        .join(&app.config.theme.assets_subdir)
        .join(name);
    response::serve_file(request, &path, "")
}

fn host_allowed(app: &App, request: &Request) -> bool {
    if app.config.site.host.is_empty() {
        return true;
    }
    let Some(host) = request_header(request, "Host") else {
        return false;
    };
    let host = strip_port(&host);
    if host.eq_ignore_ascii_case(&app.config.site.host) {
        return true;
    }
    app.config
        .site
        .host_aliases
        .iter()
        .any(|alias| host.eq_ignore_ascii_case(alias))
}

fn request_header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.to_string())
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

fn decode_path(path: &str) -> String {
    percent_encoding::percent_decode_str(path)
        .decode_utf8()
        .map(Cow::into_owned)
        .unwrap_or_else(|_| path.to_string())
}

fn query_params(raw_url: &str) -> HashMap<String, String> {
    let Some((_, query)) = raw_url.split_once('?') else {
        return HashMap::new();
    };
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}
