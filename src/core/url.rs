//! URL joining and path escaping helpers.
//!
//! Route paths are kept decoded internally; escaping happens at the
//! boundary where absolute URLs or `/media/...` links are produced.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters kept verbatim inside a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Percent-escape each `/`-separated segment of a path.
pub fn escape_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// True for targets that must pass through untouched (external schemes,
/// protocol-relative URLs, data URIs).
pub fn is_external(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("data:")
        || lower.starts_with("//")
}

/// Combine a base URL (which may include a path) with a route path.
///
/// Preserves the base path and ensures the `/` route renders with a
/// trailing slash, so `https://user.github.io/repo` + `/slug` stays inside
/// the repo prefix.
pub fn join_base_url(base_url: &str, route_path: &str) -> String {
    let base_url = base_url.trim();
    let route_path = route_path.trim();
    if base_url.is_empty() {
        return route_path.to_string();
    }

    let Ok(mut parsed) = Url::parse(base_url) else {
        let base = base_url.trim_end_matches('/');
        if route_path.is_empty() || route_path == "/" {
            return format!("{base}/");
        }
        if route_path.starts_with('/') {
            return format!("{base}{route_path}");
        }
        return format!("{base}/{route_path}");
    };

    let base_path = parsed.path().trim_end_matches('/').to_string();
    if route_path.is_empty() || route_path == "/" {
        if base_path.is_empty() {
            parsed.set_path("/");
        } else {
            parsed.set_path(&format!("{base_path}/"));
        }
        return parsed.to_string();
    }

    let route = if route_path.starts_with('/') {
        route_path.to_string()
    } else {
        format!("/{route_path}")
    };
    let mut joined = if base_path.is_empty() {
        clean_path(&route)
    } else {
        clean_path(&format!("{}/{}", base_path, route.trim_start_matches('/')))
    };
    if route.ends_with('/') && joined != "/" && !joined.ends_with('/') {
        joined.push('/');
    }
    parsed.set_path(&joined);
    parsed.to_string()
}

/// Lexically clean a `/`-separated path: collapse `//` and `.`, resolve
/// `..` without escaping the root. Mirrors POSIX path cleaning for the
/// rooted case.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|s| *s != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    let joined = out.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_base_url() {
        let cases = [
            ("https://user.github.io/repo", "/slug", "https://user.github.io/repo/slug"),
            ("https://user.github.io/repo/", "/slug/", "https://user.github.io/repo/slug/"),
            ("https://user.github.io/repo", "/", "https://user.github.io/repo/"),
            ("https://user.github.io/repo", "", "https://user.github.io/repo/"),
            ("https://example.com", "/slug", "https://example.com/slug"),
            ("https://example.com/", "/", "https://example.com/"),
        ];
        for (base, path, want) in cases {
            assert_eq!(join_base_url(base, path), want, "join({base:?}, {path:?})");
        }
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/a//b/./c"), "/a/b/c");
        assert_eq!(clean_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_path("/../a"), "/a");
        assert_eq!(clean_path("a/./b"), "a/b");
        assert_eq!(clean_path("/"), "/");
    }

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("notes/pics/cat.png"), "notes/pics/cat.png");
        assert_eq!(escape_path("a b/c.png"), "a%20b/c.png");
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("https://example.com/x.png"));
        assert!(is_external("//cdn.example.com/x.png"));
        assert!(is_external("data:image/png;base64,xyz"));
        assert!(!is_external("/media/x.png"));
        assert!(!is_external("pics/x.png"));
    }
}
