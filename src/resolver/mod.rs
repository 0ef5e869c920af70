//! Link resolution against the resolve index.
//!
//! Targets written by authors (`[[My Note]]`, `guides/setup`, a bare
//! slug) are mapped to route paths through a set of lookup tables, tried
//! in the order the link rule declares. The wiki table is consulted first
//! when a rule opts into `resolve_by: wikimap`.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::page::{list_from_meta, LinkTable, ResolveIndex};
use crate::rules::{
    type_allowed, AmbiguityPolicy, CasePolicy, LookupStep, MissingPolicy, ResolveRule, Rules,
};
use crate::wikilink::{normalize_key, split_target};
use crate::{debug, log};

/// A target that could not be resolved. Policy decides whether each
/// variant is fatal, logged, or silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("ambiguous filename {target:?}")]
    Ambiguous { target: String },
    #[error("missing target {target:?}")]
    Missing { target: String },
}

/// Two distinct paths claiming the same normalized wiki key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiCollision {
    pub key: String,
    pub first: String,
    pub second: String,
}

impl std::fmt::Display for WikiCollision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "wiki key {:?} maps to both {} and {}",
            self.key, self.first, self.second
        )
    }
}

/// Lookup tables for one resolution pass.
#[derive(Debug, Default)]
pub struct ResolverIndex {
    by_path: FxHashMap<String, String>,
    by_path_lower: FxHashMap<String, String>,
    by_filename: FxHashMap<String, Vec<String>>,
    by_filename_lower: FxHashMap<String, Vec<String>>,
    by_slug: FxHashMap<String, String>,
    by_slug_lower: FxHashMap<String, String>,
    by_wiki: FxHashMap<String, String>,
    type_by_path: FxHashMap<String, String>,
}

impl ResolverIndex {
    /// Build lookup tables from the index. Wiki key collisions are fatal;
    /// every offending pair is reported.
    pub fn build(idx: &ResolveIndex, prefix: &str) -> Result<Self> {
        let mut resolver = Self::default();
        let (wiki, collisions) = build_wiki_map(idx);
        if !collisions.is_empty() {
            let listing: Vec<String> = collisions.iter().map(|c| c.to_string()).collect();
            bail!("wiki map collision: {}", listing.join("; "));
        }
        resolver.by_wiki = wiki;

        for (path, route) in &idx.routes {
            let Some(meta) = idx.meta.get(path) else {
                continue;
            };
            resolver
                .type_by_path
                .insert(path.clone(), meta.kind.clone());
            if !meta.slug.is_empty() {
                add_unique(
                    &mut resolver.by_slug,
                    &mut resolver.by_slug_lower,
                    &meta.slug,
                    path,
                );
            }
            if route.source_key.is_empty() {
                continue;
            }
            let rel = relative_key(&route.source_key, prefix);
            if !rel.is_empty() {
                add_unique(
                    &mut resolver.by_path,
                    &mut resolver.by_path_lower,
                    &rel,
                    path,
                );
            }
            let name = filename_base(&route.source_key);
            if !name.is_empty() {
                resolver
                    .by_filename
                    .entry(name.clone())
                    .or_default()
                    .push(path.clone());
                resolver
                    .by_filename_lower
                    .entry(name.to_lowercase())
                    .or_default()
                    .push(path.clone());
            }
        }
        Ok(resolver)
    }

    pub fn type_of(&self, path: &str) -> Option<&str> {
        self.type_by_path.get(path).map(String::as_str)
    }

    /// Resolve one raw target. Returns the route path and the `#anchor`
    /// tail, or `None` for a target with no base (anchor-only links are
    /// skipped rather than reported missing).
    pub fn resolve_link(
        &self,
        raw: &str,
        resolve_by: &str,
        rule: &ResolveRule,
    ) -> std::result::Result<Option<(String, String)>, ResolveError> {
        let (base, tail) = split_target(raw);
        if base.is_empty() {
            return Ok(None);
        }

        if resolve_by == "wikimap" {
            if let Some(path) = self.by_wiki.get(&normalize_key(&base)) {
                return Ok(Some((path.clone(), tail)));
            }
        }

        let insensitive = rule.case == CasePolicy::Insensitive;
        let key = if insensitive {
            base.to_lowercase()
        } else {
            base.clone()
        };
        let order: &[LookupStep] = if rule.order.is_empty() {
            &[LookupStep::Path, LookupStep::Filename, LookupStep::Slug]
        } else {
            &rule.order
        };

        for step in order {
            match step {
                LookupStep::Path => {
                    let table = if insensitive {
                        &self.by_path_lower
                    } else {
                        &self.by_path
                    };
                    if let Some(path) = table.get(&key) {
                        return Ok(Some((path.clone(), tail)));
                    }
                }
                LookupStep::Filename => {
                    if key.contains('/') {
                        continue;
                    }
                    let table = if insensitive {
                        &self.by_filename_lower
                    } else {
                        &self.by_filename
                    };
                    match table.get(&key).map(Vec::as_slice) {
                        Some([single]) => return Ok(Some((single.clone(), tail))),
                        Some([_, _, ..]) => {
                            return Err(ResolveError::Ambiguous { target: base })
                        }
                        _ => {}
                    }
                }
                LookupStep::Slug => {
                    let table = if insensitive {
                        &self.by_slug_lower
                    } else {
                        &self.by_slug
                    };
                    if let Some(path) = table.get(&key) {
                        return Ok(Some((path.clone(), tail)));
                    }
                }
            }
        }
        Err(ResolveError::Missing { target: base })
    }
}

/// Resolve every declared link across the index.
///
/// Failures accumulate per the rule's ambiguity/missing policy and are
/// surfaced together after the full pass so one broken link does not hide
/// the rest.
pub fn resolve_links(idx: &ResolveIndex, rules: &Rules, prefix: &str) -> Result<LinkTable> {
    let resolver = ResolverIndex::build(idx, prefix)?;
    let mut out: LinkTable = BTreeMap::new();
    let mut errors: Vec<String> = Vec::new();

    for (path, meta) in &idx.meta {
        let Some(raw_targets) = idx.link_targets.get(path) else {
            continue;
        };
        for rule in &rules.links {
            if !type_allowed(&meta.kind, &rule.from_types) {
                continue;
            }
            let Some(targets) = raw_targets.get(&rule.name) else {
                continue;
            };
            for target in targets {
                let resolved = match resolver.resolve_link(target, &rule.resolve_by, &rule.resolve)
                {
                    Ok(Some((resolved, _tail))) => resolved,
                    Ok(None) => continue,
                    Err(err) => {
                        apply_policy(&err, &rule.resolve, path, &rule.name, &mut errors);
                        continue;
                    }
                };
                let Some(target_type) = resolver.type_of(&resolved) else {
                    continue;
                };
                if !type_allowed(target_type, &rule.to_types) {
                    continue;
                }
                out.entry(path.clone())
                    .or_default()
                    .entry(rule.name.clone())
                    .or_default()
                    .push(resolved);
            }
        }
    }

    if !errors.is_empty() {
        for msg in &errors {
            log!("error"; "link resolve: {msg}");
        }
        bail!("link resolve failed ({} errors)", errors.len());
    }
    Ok(out)
}

fn apply_policy(
    err: &ResolveError,
    rule: &ResolveRule,
    from_path: &str,
    link_name: &str,
    errors: &mut Vec<String>,
) {
    match err {
        ResolveError::Ambiguous { .. } => match rule.ambiguity {
            AmbiguityPolicy::Error => errors.push(format!("{from_path}: {err}")),
            AmbiguityPolicy::Warn => {
                log!("index"; "{err} (from {from_path} link {link_name})");
            }
            AmbiguityPolicy::Skip => {
                debug!("index"; "{err} (from {from_path} link {link_name})");
            }
        },
        ResolveError::Missing { .. } => match rule.missing {
            MissingPolicy::Error => errors.push(format!("{from_path}: {err}")),
            MissingPolicy::WarnSkip => {
                log!("index"; "{err} (from {from_path} link {link_name})");
            }
            MissingPolicy::Skip => {
                debug!("index"; "{err} (from {from_path} link {link_name})");
            }
        },
    }
}

/// Wiki map derivation shared by the resolver (fatal collisions) and the
/// serving store (first wins, collisions reported to the caller).
pub fn build_wiki_map(idx: &ResolveIndex) -> (FxHashMap<String, String>, Vec<WikiCollision>) {
    let mut map: FxHashMap<String, String> = FxHashMap::default();
    let mut collisions = Vec::new();
    let mut add = |map: &mut FxHashMap<String, String>, key: &str, path: &str| {
        let norm = normalize_key(key);
        if norm.is_empty() {
            return;
        }
        match map.get(&norm) {
            Some(existing) if existing != path => collisions.push(WikiCollision {
                key: norm,
                first: existing.clone(),
                second: path.to_string(),
            }),
            Some(_) => {}
            None => {
                map.insert(norm, path.to_string());
            }
        }
    };

    for (path, meta) in &idx.meta {
        let route = idx.routes.get(path);
        if let Some(route) = route.filter(|r| !r.source_key.is_empty()) {
            add(&mut map, &filename_base(&route.source_key), path);
        }
        for alias in list_from_meta(&meta.fm, "aliases") {
            add(&mut map, &alias, path);
        }
        add(&mut map, &meta.title, path);
        add(&mut map, &meta.slug, path);
        if let Some(route) = route.filter(|r| !r.source_key.is_empty()) {
            add(&mut map, &relative_key(&route.source_key, ""), path);
        }
    }
    (map, collisions)
}

fn add_unique(
    raw: &mut FxHashMap<String, String>,
    lower: &mut FxHashMap<String, String>,
    key: &str,
    path: &str,
) {
    raw.entry(key.to_string()).or_insert_with(|| path.to_string());
    lower
        .entry(key.to_lowercase())
        .or_insert_with(|| path.to_string());
}

/// Source key relative to the content prefix, extension trimmed.
pub fn relative_key(source_key: &str, prefix: &str) -> String {
    let key = source_key
        .strip_prefix(prefix)
        .unwrap_or(source_key)
        .trim_start_matches('/');
    let key = key
        .strip_suffix(".md")
        .or_else(|| key.strip_suffix(".markdown"))
        .unwrap_or(key);
    key.trim().to_string()
}

/// Filename without directory or extension.
pub fn filename_base(key: &str) -> String {
    let base = key.rsplit('/').next().unwrap_or(key);
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    stem.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MetaEntry, RouteEntry};
    use serde_json::json;

    fn index_with_note() -> ResolveIndex {
        let mut idx = ResolveIndex::default();
        idx.routes.insert(
            "/note".to_string(),
            RouteEntry {
                source_key: "notes/My Note.md".to_string(),
                status: 200,
                ..RouteEntry::default()
            },
        );
        idx.meta.insert(
            "/note".to_string(),
            MetaEntry {
                kind: "post".to_string(),
                slug: "my-note".to_string(),
                title: "Different Title".to_string(),
                fm: match json!({"aliases": ["Alt Name"]}) {
                    serde_json::Value::Object(map) => map,
                    _ => unreachable!(),
                },
                ..MetaEntry::default()
            },
        );
        idx
    }

    #[test]
    fn test_wikimap_resolution() {
        let idx = index_with_note();
        let resolver = ResolverIndex::build(&idx, "").unwrap();
        let rule = ResolveRule::default();
        let cases = [
            ("My Note", "/note", ""),
            ("Alt Name", "/note", ""),
            ("[[My Note|Label]]", "/note", ""),
            ("[[My Note#Heading]]", "/note", "#Heading"),
            ("[[My Note#^block]]", "/note", "#^block"),
            ("my-note", "/note", ""),
        ];
        for (target, want_path, want_tail) in cases {
            let (path, tail) = resolver
                .resolve_link(target, "wikimap", &rule)
                .unwrap()
                .unwrap();
            assert_eq!((path.as_str(), tail.as_str()), (want_path, want_tail), "{target}");
        }
    }

    #[test]
    fn test_wiki_collision_is_fatal() {
        let mut idx = ResolveIndex::default();
        for (path, key, title) in [("/a", "a/Note.md", "A"), ("/b", "b/Note.md", "B")] {
            idx.routes.insert(
                path.to_string(),
                RouteEntry {
                    source_key: key.to_string(),
                    status: 200,
                    ..RouteEntry::default()
                },
            );
            idx.meta.insert(
                path.to_string(),
                MetaEntry {
                    title: title.to_string(),
                    ..MetaEntry::default()
                },
            );
        }
        let err = ResolverIndex::build(&idx, "").unwrap_err().to_string();
        assert!(err.contains("/a"), "{err}");
        assert!(err.contains("/b"), "{err}");
    }

    #[test]
    fn test_ordered_lookup_path_then_filename() {
        let idx = index_with_note();
        let resolver = ResolverIndex::build(&idx, "notes/").unwrap();
        let rule = ResolveRule::default();
        // Path lookup: relative key with the prefix stripped.
        let (path, _) = resolver.resolve_link("My Note", "", &rule).unwrap().unwrap();
        assert_eq!(path, "/note");
        // Filename lookup ignores keys with slashes in them.
        assert!(matches!(
            resolver.resolve_link("nosuch/unknown", "", &rule),
            Err(ResolveError::Missing { .. })
        ));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let idx = index_with_note();
        let resolver = ResolverIndex::build(&idx, "").unwrap();
        let sensitive = ResolveRule::default();
        assert!(resolver.resolve_link("MY-NOTE", "", &sensitive).is_err());
        let insensitive = ResolveRule {
            case: CasePolicy::Insensitive,
            ..ResolveRule::default()
        };
        let (path, _) = resolver
            .resolve_link("MY-NOTE", "", &insensitive)
            .unwrap()
            .unwrap();
        assert_eq!(path, "/note");
    }

    #[test]
    fn test_ambiguous_filename() {
        // Same-named files are already fatal in the wiki map, so ambiguity
        // is exercised against the filename table directly.
        let mut resolver = ResolverIndex::default();
        resolver
            .by_filename
            .insert("Note".to_string(), vec!["/a".to_string(), "/b".to_string()]);
        resolver.by_filename_lower.insert(
            "note".to_string(),
            vec!["/a".to_string(), "/b".to_string()],
        );
        let rule = ResolveRule::default();
        assert!(matches!(
            resolver.resolve_link("Note", "", &rule),
            Err(ResolveError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_anchor_only_target_skipped() {
        let idx = index_with_note();
        let resolver = ResolverIndex::build(&idx, "").unwrap();
        let rule = ResolveRule::default();
        assert_eq!(resolver.resolve_link("[[#Heading]]", "", &rule).unwrap(), None);
    }

    #[test]
    fn test_resolve_links_respects_to_types() {
        let mut idx = index_with_note();
        idx.link_targets.insert(
            "/note".to_string(),
            BTreeMap::from([("related".to_string(), vec!["My Note".to_string()])]),
        );
        let mut rules = Rules::default();
        rules.links.push(crate::rules::LinkRule {
            name: "related".to_string(),
            to_types: vec!["guide".to_string()],
            ..crate::rules::LinkRule::default()
        });
        let links = resolve_links(&idx, &rules, "").unwrap();
        assert!(links.is_empty());

        rules.links[0].to_types = vec!["post".to_string()];
        let links = resolve_links(&idx, &rules, "").unwrap();
        assert_eq!(links["/note"]["related"], vec!["/note"]);
    }

    #[test]
    fn test_resolve_links_missing_error_policy() {
        let mut idx = index_with_note();
        idx.link_targets.insert(
            "/note".to_string(),
            BTreeMap::from([("related".to_string(), vec!["No Such Note".to_string()])]),
        );
        let mut rules = Rules::default();
        rules.links.push(crate::rules::LinkRule {
            name: "related".to_string(),
            resolve: ResolveRule {
                missing: MissingPolicy::Error,
                ..ResolveRule::default()
            },
            ..crate::rules::LinkRule::default()
        });
        assert!(resolve_links(&idx, &rules, "").is_err());

        rules.links[0].resolve.missing = MissingPolicy::Skip;
        assert!(resolve_links(&idx, &rules, "").unwrap().is_empty());
    }
}
