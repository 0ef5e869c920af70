//! Page metadata derived from front-matter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

use crate::frontmatter::FmMap;

/// SEO-facing metadata for one route.
///
/// | Field | Source |
/// |---|---|
/// | `kind` | front-matter `type` |
/// | `canonical` | front-matter, else `base_url + path` |
/// | `robots` | front-matter, else derived from `noindex` |
/// | `opengraph` | front-matter `opengraph`/`og` plus derived defaults |
/// | `image` | `og_image`, first body image, or the site default |
/// | `fm` | the full front-matter map, defaults merged |
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaEntry {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub canonical: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub robots: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub opengraph: BTreeMap<String, String>,
    /// Opaque JSON-LD payload, passed through to the page head.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonld: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryModel>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "FmMap::is_empty")]
    pub fm: FmMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryModel {
    pub slug: String,
    pub title: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

impl MetaEntry {
    /// Deterministic digest over every field that affects rendering; one
    /// of the inputs to the route etag.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.kind.as_bytes());
        hasher.update(self.slug.as_bytes());
        hasher.update(self.title.as_bytes());
        hasher.update(self.description.as_bytes());
        hasher.update(self.canonical.as_bytes());
        hasher.update(self.robots.as_bytes());
        if !self.opengraph.is_empty() {
            if let Ok(og) = serde_json::to_string(&self.opengraph) {
                hasher.update(og.as_bytes());
            }
        }
        if let Some(jsonld) = &self.jsonld {
            if let Ok(raw) = serde_json::to_string(jsonld) {
                hasher.update(raw.as_bytes());
            }
        }
        hasher.update(self.image.as_bytes());
        if !self.fm.is_empty() {
            if let Ok(fm) = serde_json::to_string(&self.fm) {
                hasher.update(fm.as_bytes());
            }
        }
        if let Some(category) = &self.category {
            hasher.update(category.slug.as_bytes());
            hasher.update(category.title.as_bytes());
            hasher.update(category.path.as_bytes());
            hasher.update(category.description.as_bytes());
            hasher.update(category.source_key.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
