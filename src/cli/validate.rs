//! The `validate` command: structural rule checks plus invariants over a
//! persisted resolve index.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::log;
use crate::page::ResolveIndex;
use crate::resolver;
use crate::rules::{self, Rules};

pub fn run(
    config: &Config,
    rules: &Rules,
    resolve_override: Option<&Path>,
    check_links: bool,
) -> Result<()> {
    rules::validate(rules).context("rules validation")?;

    let resolve_path: Option<PathBuf> = match resolve_override {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let candidate = config.resolve_path();
            candidate.exists().then_some(candidate)
        }
    };

    match resolve_path {
        Some(path) => {
            let idx = validate_resolve(&path).context("resolve validation")?;
            if check_links {
                resolver::resolve_links(&idx, rules, &config.content.prefix)
                    .context("link validation")?;
            }
        }
        None if check_links => {
            bail!("link validation: resolve.json not found (use --resolve)");
        }
        None => {}
    }
    log!("validate"; "validate completed");
    Ok(())
}

/// Load a resolve index and check its structural invariants: every 200
/// route has metadata, redirect status matches redirect targets, and
/// resolved links only point at known routes.
pub fn validate_resolve(path: &Path) -> Result<ResolveIndex> {
    let data = std::fs::read(path).with_context(|| format!("read resolve {}", path.display()))?;
    let idx: ResolveIndex = serde_json::from_slice(&data).context("parse resolve")?;
    if idx.routes.is_empty() {
        bail!("resolve routes empty");
    }
    if idx.meta.is_empty() {
        bail!("resolve meta empty");
    }
    for (route_path, route) in &idx.routes {
        if route.status == 200 && !idx.meta.contains_key(route_path) {
            bail!("route {route_path:?} missing meta");
        }
        if (route.status == 301) != !route.redirect_to.is_empty() {
            bail!(
                "route {route_path:?} status {} does not match redirect_to {:?}",
                route.status,
                route.redirect_to
            );
        }
    }
    for (from, links) in &idx.links {
        for (name, targets) in links {
            for target in targets {
                if !idx.routes.contains_key(target) {
                    bail!("link {name:?} from {from:?} points at unknown route {target:?}");
                }
            }
        }
    }
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MetaEntry, RouteEntry};
    use std::collections::BTreeMap;

    fn valid_index() -> ResolveIndex {
        let mut idx = ResolveIndex::default();
        idx.routes.insert(
            "/posts/intro".to_string(),
            RouteEntry {
                source_key: "notes/intro.md".to_string(),
                status: 200,
                ..RouteEntry::default()
            },
        );
        idx.meta
            .insert("/posts/intro".to_string(), MetaEntry::default());
        idx
    }

    fn write(idx: &ResolveIndex) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolve.json");
        std::fs::write(&path, serde_json::to_vec(idx).unwrap()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_valid_index_passes() {
        let (_dir, path) = write(&valid_index());
        assert!(validate_resolve(&path).is_ok());
    }

    #[test]
    fn test_missing_meta_rejected() {
        let mut idx = valid_index();
        idx.meta.clear();
        idx.meta.insert("/other".to_string(), MetaEntry::default());
        let (_dir, path) = write(&idx);
        let err = validate_resolve(&path).unwrap_err().to_string();
        assert!(err.contains("missing meta"), "{err}");
    }

    #[test]
    fn test_redirect_invariant() {
        let mut idx = valid_index();
        idx.routes.insert(
            "/moved".to_string(),
            RouteEntry {
                status: 301,
                redirect_to: String::new(),
                ..RouteEntry::default()
            },
        );
        let (_dir, path) = write(&idx);
        assert!(validate_resolve(&path).is_err());
    }

    #[test]
    fn test_dangling_link_rejected() {
        let mut idx = valid_index();
        idx.links.insert(
            "/posts/intro".to_string(),
            BTreeMap::from([("related".to_string(), vec!["/nowhere".to_string()])]),
        );
        let (_dir, path) = write(&idx);
        let err = validate_resolve(&path).unwrap_err().to_string();
        assert!(err.contains("unknown route"), "{err}");
    }

    #[test]
    fn test_empty_routes_rejected() {
        let (_dir, path) = write(&ResolveIndex::default());
        assert!(validate_resolve(&path).is_err());
    }
}
