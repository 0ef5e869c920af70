//! Loose-typed accessors over front-matter maps.
//!
//! Front-matter values arrive as JSON-shaped values with author-chosen
//! types; these helpers apply the permissive coercions the pipeline
//! promises (`"yes"` is a truthy noindex, a bare string is a one-element
//! list, and so on).

use serde_json::Value;

use crate::frontmatter::FmMap;

/// String value of `key`, trimmed. Non-strings read as empty.
pub fn string_from_meta(meta: &FmMap, key: &str) -> String {
    match meta.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

/// Truthiness of `key`: booleans directly, numbers as non-zero, strings
/// via `true/1/yes/y`.
pub fn bool_from_meta(meta: &FmMap, key: &str) -> bool {
    match meta.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y"
        ),
        _ => false,
    }
}

/// String-valued map at `key`; scalar values are stringified.
pub fn map_from_meta(meta: &FmMap, key: &str) -> std::collections::BTreeMap<String, String> {
    let mut out = std::collections::BTreeMap::new();
    if let Some(Value::Object(map)) = meta.get(key) {
        for (k, v) in map {
            out.insert(k.clone(), value_to_string(v));
        }
    }
    out
}

/// A string or list-of-strings value flattened into a vec, blank entries
/// dropped.
pub fn list_from_meta(meta: &FmMap, key: &str) -> Vec<String> {
    match meta.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Render any JSON value as display text (strings unquoted).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
