//! Collection evaluation: filter, forward, and backref queries over the
//! resolve index.
//!
//! Collections power page-level listings ("recent posts", "notes linking
//! here") and materialized JSON artifacts. Evaluation is pure: the index
//! is read-only and backref tables are derived on the fly, never stored.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::page::{CollectionGroup, CollectionItem, CollectionResult, ResolveIndex};
use crate::rules::{
    CollectionKind, CollectionRule, FmType, GroupByRule, Rules, SortRule, WhereRule,
};

/// Evaluate every declared collection relative to `current_path`.
pub fn build_collections(
    idx: &ResolveIndex,
    rules: &Rules,
    current_path: &str,
) -> BTreeMap<String, CollectionResult> {
    let mut out = BTreeMap::new();
    if rules.collections.is_empty() {
        return out;
    }
    let current_slug = idx
        .meta
        .get(current_path)
        .map(|m| m.slug.clone())
        .unwrap_or_default();
    let slug_index = build_slug_index(idx);
    let backrefs = build_backrefs(idx);

    for (name, rule) in &rules.collections {
        let mut items = collect_items(idx, rule, &current_slug, &slug_index, &backrefs);

        items = filter_items(items, &rule.where_, &rules.fm_schema);
        if !rule.sort.by.is_empty() {
            sort_items(&mut items, &rule.sort, &rules.fm_schema);
        }
        if rule.limit > 0 && items.len() > rule.limit {
            items.truncate(rule.limit);
        }

        let result = if rule.group_by.by.is_empty() {
            CollectionResult {
                items,
                ..CollectionResult::default()
            }
        } else {
            CollectionResult {
                groups: group_items(items, &rule.group_by, &rules.fm_schema),
                ..CollectionResult::default()
            }
        };
        out.insert(name.clone(), result);
    }
    out
}

fn collect_items(
    idx: &ResolveIndex,
    rule: &CollectionRule,
    current_slug: &str,
    slug_index: &BTreeMap<String, String>,
    backrefs: &BTreeMap<String, BTreeMap<String, Vec<String>>>,
) -> Vec<CollectionItem> {
    match rule.kind {
        CollectionKind::Filter => idx
            .meta
            .keys()
            .map(|path| idx.collection_item(path))
            .collect(),
        CollectionKind::Forward => {
            let from_slug = pick_slug(&rule.from_slug, current_slug);
            let Some(from_path) = slug_index.get(&from_slug) else {
                return Vec::new();
            };
            idx.links
                .get(from_path)
                .and_then(|links| links.get(&rule.link))
                .map(|targets| {
                    targets
                        .iter()
                        .map(|target| idx.collection_item(target))
                        .collect()
                })
                .unwrap_or_default()
        }
        CollectionKind::Backrefs => {
            let to_slug = pick_slug(&rule.to_slug, current_slug);
            let Some(to_path) = slug_index.get(&to_slug) else {
                return Vec::new();
            };
            backrefs
                .get(&rule.link)
                .and_then(|by_target| by_target.get(to_path))
                .map(|sources| {
                    sources
                        .iter()
                        .map(|source| idx.collection_item(source))
                        .collect()
                })
                .unwrap_or_default()
        }
    }
}

/// Substitute `{{ page.slug }}` in a slug template, defaulting to the
/// current page's slug.
fn pick_slug(template: &str, current_slug: &str) -> String {
    if template.is_empty() {
        return current_slug.to_string();
    }
    let resolved = template.replace("{{ page.slug }}", current_slug);
    if resolved.is_empty() {
        current_slug.to_string()
    } else {
        resolved
    }
}

fn build_slug_index(idx: &ResolveIndex) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (path, meta) in &idx.meta {
        if meta.slug.is_empty() {
            continue;
        }
        out.entry(meta.slug.clone()).or_insert_with(|| path.clone());
    }
    out
}

/// Invert the resolved link table once: `link name -> target -> sources`.
fn build_backrefs(idx: &ResolveIndex) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    let mut out: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for (from, links) in &idx.links {
        for (name, targets) in links {
            let by_target = out.entry(name.clone()).or_default();
            for to in targets {
                by_target.entry(to.clone()).or_default().push(from.clone());
            }
        }
    }
    out
}

fn filter_items(
    items: Vec<CollectionItem>,
    where_: &WhereRule,
    schema: &BTreeMap<String, FmType>,
) -> Vec<CollectionItem> {
    if where_.all.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            where_.all.iter().all(|clause| {
                if !clause.type_in.is_empty() && !clause.type_in.iter().any(|t| *t == item.kind) {
                    return false;
                }
                if let Some(fm_eq) = &clause.fm_eq {
                    if !fm_equals(item, &fm_eq.key, &fm_eq.value, schema) {
                        return false;
                    }
                }
                true
            })
        })
        .collect()
}

/// Typed equality for a front-matter field, comparator chosen by the
/// declared schema (number, boolean, else trimmed string).
fn fm_equals(
    item: &CollectionItem,
    key: &str,
    expected: &Value,
    schema: &BTreeMap<String, FmType>,
) -> bool {
    if key.is_empty() {
        return false;
    }
    let Some(actual) = item.fm.get(key) else {
        return false;
    };
    match schema.get(key).copied().unwrap_or_default() {
        FmType::Number => to_float(actual) == to_float(expected),
        FmType::Boolean => to_bool(actual) == to_bool(expected),
        FmType::String => {
            display_value(actual).trim() == display_value(expected).trim()
        }
    }
}

/// Comparable sort key; `None` marks a missing value for nulls ordering.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl SortKey {
    fn less_than(&self, other: &SortKey) -> bool {
        match (self, other) {
            (SortKey::Num(a), SortKey::Num(b)) => a < b,
            (SortKey::Bool(a), SortKey::Bool(b)) => !*a && *b,
            (a, b) => a.display() < b.display(),
        }
    }

    fn display(&self) -> String {
        match self {
            SortKey::Str(s) => s.clone(),
            SortKey::Num(n) => n.to_string(),
            SortKey::Bool(b) => b.to_string(),
        }
    }
}

pub(crate) fn sort_items(
    items: &mut [CollectionItem],
    rule: &SortRule,
    schema: &BTreeMap<String, FmType>,
) {
    let descending = rule.descending();
    items.sort_by(|a, b| {
        let ka = sort_value(a, &rule.by, schema);
        let kb = sort_value(b, &rule.by, schema);
        let ordering = match (&ka, &kb) {
            (None, None) => std::cmp::Ordering::Equal,
            // Nulls sort first unless nulls_last flips them; direction
            // does not apply to the null bucket.
            (None, Some(_)) => {
                return if rule.nulls_last {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Less
                };
            }
            (Some(_), None) => {
                return if rule.nulls_last {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                };
            }
            (Some(a), Some(b)) => {
                if a.less_than(b) {
                    std::cmp::Ordering::Less
                } else if b.less_than(a) {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            }
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn sort_value(
    item: &CollectionItem,
    by: &str,
    schema: &BTreeMap<String, FmType>,
) -> Option<SortKey> {
    match by {
        "title" => (!item.title.is_empty()).then(|| SortKey::Str(item.title.to_lowercase())),
        "slug" => (!item.slug.is_empty()).then(|| SortKey::Str(item.slug.to_lowercase())),
        "updated_at" | "created_at" => {
            (!item.updated_at.is_empty()).then(|| SortKey::Str(item.updated_at.clone()))
        }
        _ => {
            let key = by.strip_prefix("fm.")?;
            let value = item.fm.get(key)?;
            Some(match schema.get(key).copied().unwrap_or_default() {
                FmType::Number => SortKey::Num(to_float(value)),
                FmType::Boolean => SortKey::Bool(to_bool(value)),
                FmType::String => SortKey::Str(display_value(value).to_lowercase()),
            })
        }
    }
}

fn group_items(
    items: Vec<CollectionItem>,
    rule: &GroupByRule,
    schema: &BTreeMap<String, FmType>,
) -> Vec<CollectionGroup> {
    let mut buckets: BTreeMap<String, Vec<CollectionItem>> = BTreeMap::new();
    for item in items {
        for key in group_keys(&item, &rule.by, rule.multi) {
            buckets.entry(key).or_default().push(item.clone());
        }
    }
    let mut keys: Vec<String> = buckets.keys().cloned().collect();
    if rule.group_sort.descending() {
        keys.reverse();
    }
    keys.into_iter()
        .map(|key| {
            let mut items = buckets.remove(&key).unwrap_or_default();
            if !rule.item_sort.by.is_empty() {
                sort_items(&mut items, &rule.item_sort, schema);
            }
            if rule.item_limit > 0 && items.len() > rule.item_limit {
                items.truncate(rule.item_limit);
            }
            CollectionGroup { key, items }
        })
        .collect()
}

/// Bucket keys for one item: the type name, or a front-matter value
/// (each element separately when `multi` is set and the value is a list).
fn group_keys(item: &CollectionItem, by: &str, multi: bool) -> Vec<String> {
    match by {
        "type" => {
            if item.kind.is_empty() {
                Vec::new()
            } else {
                vec![item.kind.clone()]
            }
        }
        _ => {
            let Some(key) = by.strip_prefix("fm.") else {
                return Vec::new();
            };
            let Some(value) = item.fm.get(key) else {
                return Vec::new();
            };
            if multi {
                if let Value::Array(entries) = value {
                    return entries.iter().map(display_value).collect();
                }
            }
            vec![display_value(value)]
        }
    }
}

fn display_value(value: &Value) -> String {
    crate::page::value_to_string(value)
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        other => display_value(other).trim().parse().unwrap_or(0.0),
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y"
        ),
        other => display_value(other) == "true",
    }
}
