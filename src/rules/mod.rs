//! The rules file: the validation and behavior contract for a corpus.
//!
//! Rules declare required front-matter fields, per-type permalink and
//! template assignments, link declarations with resolution policies,
//! collection queries, sitemap/search filters, and the action taken on
//! each validation failure class.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Policy for a validation failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Error,
    #[default]
    Warn,
    Skip,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ActionRule {
    pub action: Action,
}

impl ActionRule {
    pub fn is_error(self) -> bool {
        self.action == Action::Error
    }
}

/// Declared front-matter value type, used to pick comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FmType {
    #[default]
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub version: u32,
    pub fields: FieldContract,
    pub fm_schema: BTreeMap<String, FmType>,
    pub types: BTreeMap<String, TypeDef>,
    pub links: Vec<LinkRule>,
    pub collections: BTreeMap<String, CollectionRule>,
    pub sitemap: SitemapRule,
    pub search: SearchRule,
    pub artifacts: ArtifactsRule,
    pub validation: ValidationRule,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FieldContract {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub defaults: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TypeDef {
    pub template: String,
    pub permalink: String,
    pub include_in: IncludeInRule,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct IncludeInRule {
    pub sitemap: bool,
    pub search: bool,
}

/// How link targets are harvested from a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// A front-matter field holds the target(s).
    #[default]
    Field,
    /// `[[...]]` links are scanned out of the body.
    Wikilinks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSyntax {
    #[default]
    Plain,
    Wikilink,
    Auto,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkRule {
    pub name: String,
    pub kind: LinkKind,
    pub field: String,
    pub from_types: Vec<String>,
    pub to_types: Vec<String>,
    pub value_syntax: ValueSyntax,
    pub resolve: ResolveRule,
    /// `wikimap` consults the normalized wiki table before the ordered
    /// lookup; empty goes straight to the ordered lookup.
    pub resolve_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    Error,
    #[default]
    Warn,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    Error,
    WarnSkip,
    #[default]
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePolicy {
    #[default]
    Sensitive,
    Insensitive,
}

/// One lookup step in the ordered resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupStep {
    Path,
    Filename,
    Slug,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResolveRule {
    pub order: Vec<LookupStep>,
    pub ambiguity: AmbiguityPolicy,
    pub missing: MissingPolicy,
    pub case: CasePolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectionRule {
    pub kind: CollectionKind,
    pub materialize: bool,
    pub link: String,
    pub from_slug: String,
    pub to_slug: String,
    #[serde(rename = "where")]
    pub where_: WhereRule,
    pub sort: SortRule,
    pub limit: usize,
    pub group_by: GroupByRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    #[default]
    Filter,
    Forward,
    Backrefs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhereRule {
    pub all: Vec<WhereClause>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WhereClause {
    pub type_in: Vec<String>,
    pub fm_eq: Option<FmEq>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FmEq {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SortRule {
    pub by: String,
    pub dir: String,
    pub nulls_last: bool,
}

impl SortRule {
    pub fn descending(&self) -> bool {
        self.dir.eq_ignore_ascii_case("desc")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroupByRule {
    pub by: String,
    pub multi: bool,
    pub group_sort: SortRule,
    pub item_sort: SortRule,
    pub item_limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SitemapRule {
    pub include_types: Vec<String>,
    pub exclude_drafts: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchRule {
    pub include_types: Vec<String>,
    pub exclude_drafts: bool,
    pub fields_boost: SearchFieldsBoost,
    pub preview: SearchPreview,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchFieldsBoost {
    pub title: f64,
    pub description: f64,
    pub body: f64,
    pub fm: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchPreview {
    pub from: String,
    pub max_len: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArtifactsRule {
    pub collections: CollectionsArtifactsRule,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionsArtifactsRule {
    pub enabled: bool,
    pub dir: String,
}

impl Default for CollectionsArtifactsRule {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidationRule {
    pub single_page_of_type: BTreeMap<String, usize>,
    pub duplicate_route: ActionRule,
    pub unknown_type: ActionRule,
    pub unique_slug: ActionRule,
    pub permalink_requires_slug: ActionRule,
    pub missing_template: ActionRule,
    pub materialize_requires_limit: bool,
    pub materialize_group_by_requires_item_limit: bool,
}

/// Load rules from a YAML file. An empty path yields default rules.
pub fn load(path: &str) -> Result<Rules> {
    if path.is_empty() {
        return Ok(Rules {
            version: 1,
            ..Rules::default()
        });
    }
    let data = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("read rules {path}"))?;
    let mut rules: Rules = serde_yaml::from_str(&data).context("parse rules")?;
    if rules.version == 0 {
        rules.version = 1;
    }
    Ok(rules)
}

/// Structural checks that do not need content: materialized collections
/// must be bounded when the validation section demands it.
pub fn validate(rules: &Rules) -> Result<()> {
    let v = &rules.validation;
    if !v.materialize_requires_limit && !v.materialize_group_by_requires_item_limit {
        return Ok(());
    }
    for (name, col) in &rules.collections {
        if !col.materialize {
            continue;
        }
        if v.materialize_requires_limit && col.limit == 0 {
            bail!("collection {name:?} materialize requires limit");
        }
        if v.materialize_group_by_requires_item_limit
            && !col.group_by.by.is_empty()
            && col.group_by.item_limit == 0
        {
            bail!("collection {name:?} materialize requires group_by.item_limit");
        }
    }
    Ok(())
}

/// Empty list allows any type.
pub fn type_allowed(value: &str, allowed: &[String]) -> bool {
    allowed.is_empty() || allowed.iter().any(|t| t == value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_defaults() {
        let rules = load("").unwrap();
        assert_eq!(rules.version, 1);
        assert!(rules.types.is_empty());
    }

    #[test]
    fn test_parse_full_shape() {
        let yaml = r#"
version: 1
fields:
  required: [type, title]
  defaults:
    draft: false
fm_schema:
  year: number
  draft: boolean
types:
  post:
    template: post.html
    permalink: "/posts/{{ slug }}"
    include_in: { sitemap: true, search: true }
links:
  - name: related
    kind: field
    field: related
    value_syntax: auto
    resolve:
      order: [path, filename, slug]
      ambiguity: error
      missing: warn_skip
      case: insensitive
    resolve_by: wikimap
collections:
  recent:
    kind: filter
    materialize: true
    limit: 10
    sort: { by: updated_at, dir: desc }
sitemap:
  include_types: [post]
  exclude_drafts: true
search:
  fields_boost:
    title: 2.0
    fm:
      tags: 0.8
validation:
  duplicate_route: { action: error }
  unique_slug: { action: warn }
  materialize_requires_limit: true
"#;
        let rules: Rules = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.types["post"].permalink, "/posts/{{ slug }}");
        let link = &rules.links[0];
        assert_eq!(link.kind, LinkKind::Field);
        assert_eq!(link.value_syntax, ValueSyntax::Auto);
        assert_eq!(link.resolve.ambiguity, AmbiguityPolicy::Error);
        assert_eq!(link.resolve.missing, MissingPolicy::WarnSkip);
        assert_eq!(link.resolve.case, CasePolicy::Insensitive);
        assert_eq!(
            link.resolve.order,
            vec![LookupStep::Path, LookupStep::Filename, LookupStep::Slug]
        );
        assert!(rules.validation.duplicate_route.is_error());
        assert!(!rules.validation.unique_slug.is_error());
        assert_eq!(rules.fm_schema["year"], FmType::Number);
        assert!(validate(&rules).is_ok());
    }

    #[test]
    fn test_materialize_requires_limit() {
        let yaml = r#"
collections:
  bad:
    kind: filter
    materialize: true
    limit: 0
validation:
  materialize_requires_limit: true
"#;
        let rules: Rules = serde_yaml::from_str(yaml).unwrap();
        assert!(validate(&rules).is_err());
    }

    #[test]
    fn test_type_allowed() {
        assert!(type_allowed("post", &[]));
        assert!(type_allowed("post", &["post".to_string()]));
        assert!(!type_allowed("note", &["post".to_string()]));
    }
}
