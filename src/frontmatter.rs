//! Front-matter splitting and parsing.
//!
//! A note body may start with a `---`-delimited YAML header. Input is
//! BOM-tolerant and line endings are normalized to LF before the split,
//! so notes exported from Windows editors index identically.

use anyhow::{Context, Result};
use serde_json::Value;

/// Parsed front-matter: string keys, JSON-shaped values.
pub type FmMap = serde_json::Map<String, Value>;

/// Split raw note bytes into (front-matter map, body).
///
/// When no header is present the map is empty and the whole input is the
/// body. A header that fails to parse as YAML is an error for this key.
pub fn parse(body: &[u8]) -> Result<(FmMap, String)> {
    let text = String::from_utf8_lossy(body);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let start = normalized.trim_start_matches([' ', '\t', '\n']);
    if let Some(rest) = start.strip_prefix("---") {
        if let Some(split) = rest.find("\n---") {
            let header = &rest[..split];
            let tail = &rest[split + "\n---".len()..];
            let meta = parse_yaml_map(header).context("frontmatter yaml")?;
            return Ok((meta, tail.to_string()));
        }
    }
    Ok((FmMap::new(), normalized))
}

/// Parse a YAML fragment into a JSON-valued map.
///
/// YAML is parsed with serde_yaml and converted through serde_json so
/// downstream code handles a single value representation. A header that
/// is valid YAML but not a mapping (and not empty) is rejected.
fn parse_yaml_map(yaml: &str) -> Result<FmMap> {
    if yaml.trim().is_empty() {
        return Ok(FmMap::new());
    }
    let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let json: Value = serde_json::to_value(parsed)?;
    match json {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(FmMap::new()),
        other => anyhow::bail!("frontmatter is not a mapping (got {})", kind_of(&other)),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
