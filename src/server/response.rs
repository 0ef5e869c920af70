//! HTTP response helpers over tiny_http.
//!
//! Every helper returns the status it sent so the dispatcher can feed
//! the per-class response counters.

use std::path::Path;

use anyhow::Result;
use tiny_http::{Header, Request, Response, StatusCode};

/// Common content types.
pub mod mime {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const XML: &str = "application/xml";
}

pub fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .unwrap_or_else(|_| Header::from_bytes(&b"X-Invalid-Header"[..], &b""[..]).unwrap())
}

/// Send a body with a content type and optional extra headers.
pub fn send(
    request: Request,
    status: u16,
    content_type: &str,
    body: Vec<u8>,
    extra: Vec<Header>,
) -> Result<u16> {
    let mut response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", content_type));
    for h in extra {
        response = response.with_header(h);
    }
    request.respond(response)?;
    Ok(status)
}

pub fn send_html(request: Request, status: u16, body: String, extra: Vec<Header>) -> Result<u16> {
    send(request, status, mime::HTML, body.into_bytes(), extra)
}

pub fn send_text(request: Request, status: u16, body: &str) -> Result<u16> {
    send(request, status, mime::PLAIN, body.as_bytes().to_vec(), Vec::new())
}

pub fn send_json(request: Request, status: u16, payload: &impl serde::Serialize) -> Result<u16> {
    let body = serde_json::to_vec(payload)?;
    send(request, status, mime::JSON, body, Vec::new())
}

/// Send an empty response (301/304/307 and friends).
pub fn send_empty(request: Request, status: u16, extra: Vec<Header>) -> Result<u16> {
    let mut response = Response::empty(StatusCode(status));
    for h in extra {
        response = response.with_header(h);
    }
    request.respond(response)?;
    Ok(status)
}

/// Serve a file from disk with a guessed content type, or 404.
pub fn serve_file(request: Request, path: &Path, fallback_type: &str) -> Result<u16> {
    let Ok(body) = std::fs::read(path) else {
        return send_text(request, 404, "404 Not Found");
    };
    let content_type = content_type_for(path, fallback_type);
    send(request, 200, content_type, body, Vec::new())
}

/// Serve in-memory bytes with a content type guessed from `path`.
pub fn serve_bytes(request: Request, path: &Path, body: Vec<u8>) -> Result<u16> {
    let content_type = content_type_for(path, "");
    send(request, 200, content_type, body, Vec::new())
}

/// Extension → content type, with a caller-provided fallback.
fn content_type_for<'a>(path: &Path, fallback: &'a str) -> &'a str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let known: &'static str = match ext.as_str() {
        "html" | "htm" => mime::HTML,
        "txt" => mime::PLAIN,
        "json" => mime::JSON,
        "xml" => mime::XML,
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "",
    };
    if known.is_empty() {
        if fallback.is_empty() {
            "application/octet-stream"
        } else {
            fallback
        }
    } else {
        known
    }
}

/// Reject asset names that could walk out of the theme directory.
pub fn is_safe_asset(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.starts_with('/')
        && !name.starts_with('\\')
        && !name.contains('\0')
}

/// Reject media keys that normalize outside the content tree.
pub fn is_safe_key(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    let clean = crate::core::url::clean_path(&format!("/{key}"));
    clean != "/" && !clean.split('/').any(|segment| segment == "..")
}
