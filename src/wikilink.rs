//! Wiki-style target parsing and normalization.
//!
//! Obsidian-flavored targets come in many spellings: `Name`, `[[Name]]`,
//! `[[Name|Label]]`, `[[Name#Heading]]`, `[[Name#^block]]`, with optional
//! `./` or `/` prefixes and `.md`/`.markdown` suffixes. Wiki map keys are
//! compared after case folding and whitespace collapsing.

/// Normalize a wiki map key: trim, Unicode case fold, collapse internal
/// whitespace. Idempotent.
pub fn normalize_key(value: &str) -> String {
    let folded = value.trim().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a wiki-like target into `(base, tail)`.
///
/// `base` is the bare target: label, brackets, leading `./` or `/`, and a
/// trailing `.md`/`.markdown` extension are stripped. `tail` is the
/// `#Heading` / `#^block` anchor including the leading `#`, or empty.
pub fn split_target(raw: &str) -> (String, String) {
    let mut inner = raw.trim();
    if inner.is_empty() {
        return (String::new(), String::new());
    }
    if inner.starts_with("[[") && inner.ends_with("]]") {
        inner = inner[2..inner.len() - 2].trim();
    }
    if inner.is_empty() {
        return (String::new(), String::new());
    }

    let (body, tail) = match inner.find('#') {
        Some(idx) => (&inner[..idx], inner[idx..].to_string()),
        None => (inner, String::new()),
    };

    let base = body.split('|').next().unwrap_or(body).trim();
    let base = base
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim();
    let base = base
        .strip_suffix(".md")
        .or_else(|| base.strip_suffix(".markdown"))
        .unwrap_or(base)
        .trim();
    (base.to_string(), tail)
}

/// Bare target with label, anchor, prefixes, and extension discarded.
pub fn normalize_target(raw: &str) -> String {
    split_target(raw).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_folds_and_collapses() {
        assert_eq!(normalize_key("  My   Note  "), "my note");
        assert_eq!(normalize_key("MY NOTE"), "my note");
        assert_eq!(normalize_key("Straße"), "straße");
        assert_eq!(normalize_key(""), "");
    }

    #[test]
    fn test_normalize_key_idempotent() {
        let once = normalize_key("  Mixed   CASE  name ");
        assert_eq!(normalize_key(&once), once);
    }

    #[test]
    fn test_split_target_shapes() {
        assert_eq!(split_target("Name"), ("Name".into(), "".into()));
        assert_eq!(split_target("[[Name]]"), ("Name".into(), "".into()));
        assert_eq!(split_target("[[Name|Label]]"), ("Name".into(), "".into()));
        assert_eq!(
            split_target("[[Name#Heading]]"),
            ("Name".into(), "#Heading".into())
        );
        assert_eq!(
            split_target("[[Name#^block]]"),
            ("Name".into(), "#^block".into())
        );
    }

    #[test]
    fn test_split_target_path_label_heading() {
        assert_eq!(
            split_target("[[A/B.md|Label#H]]"),
            ("A/B".into(), "#H".into())
        );
    }

    #[test]
    fn test_split_target_prefixes_and_extensions() {
        assert_eq!(split_target("./notes/a.md"), ("notes/a".into(), "".into()));
        assert_eq!(split_target("/notes/a.markdown"), ("notes/a".into(), "".into()));
    }

    #[test]
    fn test_split_target_anchor_only() {
        assert_eq!(split_target("[[#Heading]]"), ("".into(), "#Heading".into()));
        assert_eq!(split_target(""), ("".into(), "".into()));
    }
}
