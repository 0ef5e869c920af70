//! The indexing run: ingest, validate, resolve, emit.
//!
//! Single-threaded per process, serialized across processes by an
//! advisory lock. Validation errors accumulate per key and fail the run
//! as one aggregate after every key has been seen; artifacts on disk are
//! only replaced after the whole run has succeeded.

pub mod links;
pub mod lock;
pub mod meta;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::artifacts;
use crate::config::Config;
use crate::frontmatter;
use crate::logger::ProgressLine;
use crate::media;
use crate::page::{
    bool_from_meta, route_etag, string_from_meta, MetaEntry, ResolveIndex, RouteEntry, Snapshot,
    SnapshotEntry,
};
use crate::resolver;
use crate::rules::{self, Rules};
use crate::source::{ContentSource, Object};
use crate::{debug, log};

/// Run a full indexing pass and atomically replace the artifacts.
pub fn run(config: &Config, source: &dyn ContentSource) -> Result<()> {
    let artifacts_dir = Path::new(&config.paths.artifacts_dir);
    let snapshot_path = Path::new(&config.paths.snapshot_file);
    let snapshot_dir = snapshot_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(artifacts_dir)?;
    std::fs::create_dir_all(snapshot_dir)?;

    let resolve_path = config.resolve_path();
    let _lock = lock::acquire(&snapshot_dir.join("index.lock"))?;

    let old_index = load_resolve(&resolve_path).unwrap_or_default();
    let old_snapshot = load_snapshot(snapshot_path).unwrap_or_default();

    let rules = rules::load(&config.rules_path).context("load rules")?;
    rules::validate(&rules)?;

    let objects = source.list(&config.content.prefix)?;
    let mut current: BTreeMap<String, Object> = BTreeMap::new();
    for object in objects {
        if object.key.to_lowercase().ends_with(".md") {
            current.insert(object.key.clone(), object);
        }
    }
    debug!("index"; "listed {} markdown objects", current.len());

    let mut old_key_to_path: FxHashMap<&str, &str> = FxHashMap::default();
    for (path, route) in &old_index.routes {
        if !route.source_key.is_empty() {
            old_key_to_path.insert(route.source_key.as_str(), path.as_str());
        }
    }

    let mut new_snapshot = Snapshot::new();
    let mut new_index = ResolveIndex::default();
    let mut used_paths: FxHashSet<String> = FxHashSet::default();
    let mut used_slugs: FxHashSet<String> = FxHashSet::default();
    let mut type_counts: FxHashMap<String, usize> = FxHashMap::default();
    let mut errors: Vec<String> = Vec::new();

    let progress = ProgressLine::new(&[("reused", 0), ("fetched", 0), ("skipped", 0)]);
    for (key, object) in &current {
        let lm = object.last_modified_rfc3339();
        new_snapshot.insert(
            key.clone(),
            SnapshotEntry {
                etag: object.etag.clone(),
                last_modified: lm.clone(),
            },
        );

        if try_reuse(
            key,
            object,
            &lm,
            &old_snapshot,
            &old_index,
            &old_key_to_path,
            &rules,
            &mut new_index,
            &mut used_paths,
            &mut used_slugs,
            &mut type_counts,
            &mut errors,
            &progress,
        ) {
            continue;
        }

        let body_bytes = source
            .fetch(key, None)
            .with_context(|| format!("fetch {key}"))?;
        let (mut fm, body) =
            frontmatter::parse(&body_bytes).with_context(|| format!("parse frontmatter {key}"))?;
        meta::apply_fm_defaults(&mut fm, &rules.fields.defaults);

        let core = match meta::build_core(&fm, &rules) {
            Ok(core) => core,
            Err(err) => {
                errors.push(format!("{key}: {err}"));
                continue;
            }
        };
        let Some(type_def) = rules.types.get(&core.kind) else {
            if rules.validation.unknown_type.is_error() {
                errors.push(format!("{key}: unknown type {:?}", core.kind));
            } else {
                log!("index"; "unknown type {:?} (skipped): {key}", core.kind);
                progress.inc("skipped");
            }
            continue;
        };
        if type_def.template.is_empty() && rules.validation.missing_template.is_error() {
            errors.push(format!("{key}: missing template for type {:?}", core.kind));
            continue;
        }
        if type_def.permalink.trim().is_empty() {
            errors.push(format!("{key}: missing permalink for type {:?}", core.kind));
            continue;
        }
        let route_path = match build_permalink(&type_def.permalink, &core.slug, &rules) {
            Ok(path) => path,
            Err(err) => {
                errors.push(format!("{key}: {err}"));
                continue;
            }
        };

        if used_paths.contains(&route_path) {
            if rules.validation.duplicate_route.is_error() {
                errors.push(format!("{key}: duplicate route {route_path:?}"));
            } else {
                log!("index"; "duplicate route {route_path:?} (first wins): {key}");
                progress.inc("skipped");
            }
            continue;
        }
        if !core.slug.is_empty() {
            let slug_key = core.slug.to_lowercase();
            if used_slugs.contains(&slug_key) {
                if rules.validation.unique_slug.is_error() {
                    errors.push(format!("{key}: duplicate slug {:?}", core.slug));
                } else {
                    log!("index"; "duplicate slug {:?} (first wins): {key}", core.slug);
                    progress.inc("skipped");
                }
                continue;
            }
            used_slugs.insert(slug_key);
        }
        used_paths.insert(route_path.clone());
        *type_counts.entry(core.kind.clone()).or_default() += 1;

        let meta_entry = meta::build_meta_entry(&fm, &core, &body, config, &route_path, key);
        let route_entry = build_route_entry(&fm, &meta_entry, key, &object.etag, &lm, &route_path);
        let media_keys = media::extract_media_keys(&body, key, &config.content.prefix);
        if !media_keys.is_empty() {
            new_index.media.insert(route_path.clone(), media_keys);
        }
        new_index
            .link_targets
            .insert(route_path.clone(), links::extract_raw_targets(&fm, &body, &rules));
        new_index.meta.insert(route_path.clone(), meta_entry);
        new_index.routes.insert(route_path, route_entry);
        progress.inc("fetched");
    }
    progress.finish();

    if !errors.is_empty() {
        for msg in &errors {
            log!("error"; "index validation: {msg}");
        }
        bail!("index validation failed ({} errors)", errors.len());
    }
    validate_type_counts(&type_counts, &rules.validation.single_page_of_type)?;

    new_index.links = resolver::resolve_links(&new_index, &rules, &config.content.prefix)?;
    new_index.generated_at = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    artifacts::write_atomic_json(&resolve_path, &new_index).context("write resolve")?;
    artifacts::write_atomic_json(snapshot_path, &new_snapshot).context("write snapshot")?;
    artifacts::write_sitemaps(artifacts_dir, &config.site.base_url, &new_index, &rules)
        .context("write sitemap")?;
    artifacts::write_robots(artifacts_dir, &config.site.base_url, &config.robots)
        .context("write robots")?;
    artifacts::write_search_index(artifacts_dir, &new_index, &rules).context("write search")?;
    artifacts::materialize_collections(artifacts_dir, &new_index, &rules)
        .context("materialize collections")?;

    log!("index"; "indexed {} routes", new_index.routes.len());
    Ok(())
}

/// Carry an unchanged key's rows forward without fetching. Returns true
/// when the key was fully handled (reused, skipped, or errored).
#[allow(clippy::too_many_arguments)]
fn try_reuse(
    key: &str,
    object: &Object,
    lm: &str,
    old_snapshot: &Snapshot,
    old_index: &ResolveIndex,
    old_key_to_path: &FxHashMap<&str, &str>,
    rules: &Rules,
    new_index: &mut ResolveIndex,
    used_paths: &mut FxHashSet<String>,
    used_slugs: &mut FxHashSet<String>,
    type_counts: &mut FxHashMap<String, usize>,
    errors: &mut Vec<String>,
    progress: &ProgressLine,
) -> bool {
    let Some(old_entry) = old_snapshot.get(key) else {
        return false;
    };
    if old_entry.etag != object.etag {
        return false;
    }
    let Some(path) = old_key_to_path.get(key) else {
        return false;
    };
    let Some(meta_entry) = old_index.meta.get(*path) else {
        return false;
    };
    // A row without captured front-matter or link targets predates the
    // current schema; re-fetch instead of trusting it.
    if meta_entry.fm.is_empty() {
        return false;
    }
    let Some(link_targets) = old_index.link_targets.get(*path) else {
        return false;
    };

    match validate_existing(path, meta_entry, rules, used_paths, used_slugs, type_counts) {
        Outcome::Keep => {}
        Outcome::Skip => {
            progress.inc("skipped");
            return true;
        }
        Outcome::Error(msg) => {
            errors.push(format!("{key}: {msg}"));
            return true;
        }
    }

    let mut route = old_index.routes.get(*path).cloned().unwrap_or_default();
    route.last_modified = lm.to_string();
    new_index.meta.insert((*path).to_string(), meta_entry.clone());
    new_index.routes.insert((*path).to_string(), route);
    new_index
        .link_targets
        .insert((*path).to_string(), link_targets.clone());
    if let Some(media_keys) = old_index.media.get(*path) {
        if !media_keys.is_empty() {
            new_index
                .media
                .insert((*path).to_string(), media_keys.clone());
        }
    }
    progress.inc("reused");
    true
}

enum Outcome {
    Keep,
    Skip,
    Error(String),
}

/// Re-check the invariants for a reused row: its type still exists, its
/// permalink contract still holds, and it does not collide with a row
/// already admitted this run.
fn validate_existing(
    path: &str,
    meta_entry: &MetaEntry,
    rules: &Rules,
    used_paths: &mut FxHashSet<String>,
    used_slugs: &mut FxHashSet<String>,
    type_counts: &mut FxHashMap<String, usize>,
) -> Outcome {
    if meta_entry.kind.is_empty() {
        return Outcome::Error(format!("missing type for {path}"));
    }
    let Some(type_def) = rules.types.get(&meta_entry.kind) else {
        if rules.validation.unknown_type.is_error() {
            return Outcome::Error(format!("unknown type {:?}", meta_entry.kind));
        }
        log!("index"; "unknown type {:?} (skipped): {path}", meta_entry.kind);
        return Outcome::Skip;
    };
    if type_def.template.is_empty() && rules.validation.missing_template.is_error() {
        return Outcome::Error(format!("missing template for type {:?}", meta_entry.kind));
    }
    if type_def.permalink.trim().is_empty() {
        return Outcome::Error(format!("missing permalink for type {:?}", meta_entry.kind));
    }
    if (type_def.permalink.contains("{{ slug }}") || type_def.permalink.contains("{{slug}}"))
        && meta_entry.slug.trim().is_empty()
        && rules.validation.permalink_requires_slug.is_error()
    {
        return Outcome::Error("slug required by permalink".to_string());
    }
    if used_paths.contains(path) {
        if rules.validation.duplicate_route.is_error() {
            return Outcome::Error(format!("duplicate route {path:?}"));
        }
        log!("index"; "duplicate route {path:?} (first wins)");
        return Outcome::Skip;
    }
    if !meta_entry.slug.is_empty() {
        let slug_key = meta_entry.slug.to_lowercase();
        if used_slugs.contains(&slug_key) {
            if rules.validation.unique_slug.is_error() {
                return Outcome::Error(format!("duplicate slug {:?}", meta_entry.slug));
            }
            log!("index"; "duplicate slug {:?} (first wins)", meta_entry.slug);
            return Outcome::Skip;
        }
        used_slugs.insert(slug_key);
    }
    used_paths.insert(path.to_string());
    *type_counts.entry(meta_entry.kind.clone()).or_default() += 1;
    Outcome::Keep
}

/// Substitute the slug into a permalink template and normalize slashes.
fn build_permalink(template: &str, slug: &str, rules: &Rules) -> Result<String> {
    if template.is_empty() {
        bail!("missing permalink template");
    }
    let mut rendered = template.to_string();
    if rendered.contains("{{ slug }}") || rendered.contains("{{slug}}") {
        if slug.trim().is_empty() && rules.validation.permalink_requires_slug.is_error() {
            bail!("slug required by permalink");
        }
        rendered = rendered.replace("{{ slug }}", slug).replace("{{slug}}", slug);
    }
    let mut path = rendered.trim().to_string();
    if path.is_empty() {
        bail!("empty permalink");
    }
    if !path.starts_with('/') {
        path = format!("/{path}");
    }
    if path != "/" {
        path = path.trim_end_matches('/').to_string();
    }
    Ok(path)
}

fn build_route_entry(
    fm: &crate::frontmatter::FmMap,
    meta_entry: &MetaEntry,
    key: &str,
    etag: &str,
    last_modified: &str,
    route_path: &str,
) -> RouteEntry {
    let redirect_to = string_from_meta(fm, "redirect_to");
    let status = if redirect_to.is_empty() { 200 } else { 301 };
    let meta_hash = meta_entry.content_hash();
    RouteEntry {
        source_key: key.to_string(),
        etag: etag.to_string(),
        last_modified: last_modified.to_string(),
        noindex: bool_from_meta(fm, "noindex"),
        route_etag: route_etag(
            route_path,
            status,
            &redirect_to,
            key,
            etag,
            last_modified,
            &meta_hash,
        ),
        redirect_to,
        status,
    }
}

fn validate_type_counts(
    counts: &FxHashMap<String, usize>,
    expectations: &BTreeMap<String, usize>,
) -> Result<()> {
    for (type_name, expected) in expectations {
        let got = counts.get(type_name).copied().unwrap_or(0);
        if got != *expected {
            bail!("type {type_name:?} must appear {expected} time(s), got {got}");
        }
    }
    Ok(())
}

/// Best-effort load of the prior resolve index; absence is not fatal.
pub fn load_resolve(path: &Path) -> Option<ResolveIndex> {
    let data = std::fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

fn load_snapshot(path: &Path) -> Option<Snapshot> {
    let data = std::fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::local::LocalSource;
    use std::fs;
    use std::path::PathBuf;

    const RULES_YAML: &str = r#"
version: 1
types:
  post:
    template: post.html
    permalink: "/posts/{{ slug }}"
links:
  - name: mentions
    kind: wikilinks
    resolve_by: wikimap
validation:
  duplicate_route: { action: warn }
"#;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        content: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("markdown");
        fs::create_dir_all(content.join("notes")).unwrap();
        fs::write(dir.path().join("rules.yaml"), RULES_YAML).unwrap();

        let mut config = Config::default();
        config.site.base_url = "https://example.com".to_string();
        config.content.source = "local".to_string();
        config.content.local_dir = content.to_string_lossy().into_owned();
        config.paths.artifacts_dir = dir.path().join("artifacts").to_string_lossy().into_owned();
        config.paths.snapshot_file = dir
            .path()
            .join("snapshot/objects.json")
            .to_string_lossy()
            .into_owned();
        config.rules_path = dir.path().join("rules.yaml").to_string_lossy().into_owned();
        config
            .og_type_by_type
            .insert("post".to_string(), "article".to_string());
        Fixture {
            _dir: dir,
            config,
            content,
        }
    }

    fn run_fixture(fixture: &Fixture) -> Result<ResolveIndex> {
        let source = LocalSource::new(&fixture.content);
        run(&fixture.config, &source)?;
        Ok(load_resolve(&fixture.config.resolve_path()).expect("resolve.json written"))
    }

    #[test]
    fn test_single_note_end_to_end() {
        let fixture = fixture();
        fs::write(
            fixture.content.join("notes/intro.md"),
            "---\ntype: post\nslug: intro\ntitle: Intro\n---\nHello world.\n",
        )
        .unwrap();

        let idx = run_fixture(&fixture).unwrap();
        let route = &idx.routes["/posts/intro"];
        assert_eq!(route.status, 200);
        assert_eq!(route.source_key, "notes/intro.md");
        assert!(route.route_etag.starts_with("W/\""));

        let meta = &idx.meta["/posts/intro"];
        assert_eq!(meta.canonical, "https://example.com/posts/intro");
        assert_eq!(meta.opengraph["type"], "article");

        let artifacts_dir = Path::new(&fixture.config.paths.artifacts_dir);
        let sitemap = fs::read_to_string(artifacts_dir.join("sitemap-0001.xml")).unwrap();
        assert_eq!(sitemap.matches("<url>").count(), 1);
        assert!(artifacts_dir.join("robots.txt").exists());
        assert!(artifacts_dir.join("search.json").exists());
        assert!(Path::new(&fixture.config.paths.snapshot_file).exists());
    }

    #[test]
    fn test_incremental_reuse_is_byte_stable() {
        let fixture = fixture();
        fs::write(
            fixture.content.join("notes/intro.md"),
            "---\ntype: post\nslug: intro\ntitle: Intro\n---\nBody.\n",
        )
        .unwrap();
        let first = run_fixture(&fixture).unwrap();
        let second = run_fixture(&fixture).unwrap();

        let mut a = serde_json::to_value(&first).unwrap();
        let mut b = serde_json::to_value(&second).unwrap();
        a["generated_at"] = serde_json::Value::Null;
        b["generated_at"] = serde_json::Value::Null;
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_route_first_wins_under_warn() {
        let fixture = fixture();
        fs::write(
            fixture.content.join("notes/a.md"),
            "---\ntype: post\nslug: same\ntitle: First\n---\n",
        )
        .unwrap();
        fs::write(
            fixture.content.join("notes/b.md"),
            "---\ntype: post\nslug: same\ntitle: Second\n---\n",
        )
        .unwrap();

        let idx = run_fixture(&fixture).unwrap();
        assert_eq!(idx.routes.len(), 1);
        // Keys iterate sorted, so a.md wins.
        assert_eq!(idx.meta["/posts/same"].title, "First");
    }

    #[test]
    fn test_wiki_collision_fails_without_touching_artifacts() {
        let fixture = fixture();
        fs::create_dir_all(fixture.content.join("a")).unwrap();
        fs::create_dir_all(fixture.content.join("b")).unwrap();
        fs::write(
            fixture.content.join("a/Note.md"),
            "---\ntype: post\nslug: first\ntitle: First Title\n---\n",
        )
        .unwrap();
        fs::write(
            fixture.content.join("b/Note.md"),
            "---\ntype: post\nslug: second\ntitle: Second Title\n---\n",
        )
        .unwrap();

        let source = LocalSource::new(&fixture.content);
        let err = run(&fixture.config, &source).unwrap_err().to_string();
        assert!(err.contains("collision"), "{err}");
        assert!(!fixture.config.resolve_path().exists());
    }

    #[test]
    fn test_validation_errors_accumulate() {
        let fixture = fixture();
        fs::write(
            fixture.content.join("notes/bad1.md"),
            "---\ntitle: No Type\n---\n",
        )
        .unwrap();
        fs::write(
            fixture.content.join("notes/bad2.md"),
            "---\ntitle: Also No Type\n---\n",
        )
        .unwrap();
        let source = LocalSource::new(&fixture.content);
        let err = run(&fixture.config, &source).unwrap_err().to_string();
        assert!(err.contains("2 errors"), "{err}");
    }

    #[test]
    fn test_media_and_link_targets_recorded() {
        let fixture = fixture();
        fs::write(
            fixture.content.join("notes/intro.md"),
            "---\ntype: post\nslug: intro\ntitle: Intro\n---\n![[pics/cat.png|Cat]]\nSee [[Other]].\n",
        )
        .unwrap();
        fs::write(
            fixture.content.join("notes/other.md"),
            "---\ntype: post\nslug: other\ntitle: Other\n---\n",
        )
        .unwrap();

        let idx = run_fixture(&fixture).unwrap();
        assert_eq!(idx.media["/posts/intro"], vec!["notes/pics/cat.png"]);
        assert_eq!(
            idx.link_targets["/posts/intro"]["mentions"],
            vec!["[[Other]]"]
        );
        assert_eq!(idx.links["/posts/intro"]["mentions"], vec!["/posts/other"]);
    }

    #[test]
    fn test_permalink_rules() {
        let rules = rules::Rules::default();
        assert_eq!(build_permalink("/posts/{{ slug }}", "x", &rules).unwrap(), "/posts/x");
        assert_eq!(build_permalink("posts/{{slug}}/", "x", &rules).unwrap(), "/posts/x");
        assert_eq!(build_permalink("/", "", &rules).unwrap(), "/");
        assert!(build_permalink("  ", "", &rules).is_err());
    }

    #[test]
    fn test_permalink_requires_slug_policy() {
        let mut rules = rules::Rules::default();
        rules.validation.permalink_requires_slug.action = crate::rules::Action::Error;
        assert!(build_permalink("/posts/{{ slug }}", " ", &rules).is_err());
        // Warn policy substitutes the empty slug and normalizes.
        rules.validation.permalink_requires_slug.action = crate::rules::Action::Warn;
        assert_eq!(build_permalink("/posts/{{ slug }}", "", &rules).unwrap(), "/posts");
    }

    #[test]
    fn test_single_page_of_type_enforced() {
        let mut counts = FxHashMap::default();
        counts.insert("home".to_string(), 2);
        let mut expectations = BTreeMap::new();
        expectations.insert("home".to_string(), 1);
        assert!(validate_type_counts(&counts, &expectations).is_err());
        counts.insert("home".to_string(), 1);
        assert!(validate_type_counts(&counts, &expectations).is_ok());
    }
}
