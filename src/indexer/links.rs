//! Raw link-target harvesting.
//!
//! Targets are recorded exactly as the author wrote them (`[[A|Label]]`
//! keeps its brackets and label); normalization happens at resolution
//! time so `link_targets` stays a faithful record of the source.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::frontmatter::FmMap;
use crate::page::list_from_meta;
use crate::rules::{LinkKind, Rules};

static WIKI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[[^\]]+\]\]").unwrap());

/// Collect raw targets grouped by link rule name.
pub fn extract_raw_targets(
    meta: &FmMap,
    body: &str,
    rules: &Rules,
) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for rule in &rules.links {
        match rule.kind {
            LinkKind::Field => {
                for raw in list_from_meta(meta, &rule.field) {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    out.entry(rule.name.clone())
                        .or_default()
                        .push(trimmed.to_string());
                }
            }
            LinkKind::Wikilinks => {
                let normalized = body.replace("\r\n", "\n");
                for found in WIKI_RE.find_iter(&normalized) {
                    out.entry(rule.name.clone())
                        .or_default()
                        .push(found.as_str().to_string());
                }
            }
        }
    }
    out
}
