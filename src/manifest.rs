//! Bundle manifest parsing.
//!
//! A bundle describes itself either through a YAML frontmatter block at the
//! top of its marker file (`SKILL.md` / `HOOK.md`) or through a structured
//! `manifest.json` next to it. When both exist the structured manifest wins.
//!
//! Parsed metadata is exposed as a [`ParsedManifest`] with typed accessors;
//! callers never reach into raw YAML/JSON values.

use std::collections::BTreeMap;
use std::path::Path;

use crate::bundle::BundleKind;
use crate::error::{PackError, Result};
use crate::utils::fs::read_optional;

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

/// Typed view over a bundle's declared metadata.
#[derive(Debug, Clone, Default)]
pub struct ParsedManifest {
    fields: BTreeMap<String, FieldValue>,
}

impl ParsedManifest {
    /// Load the manifest for a bundle directory. Structured `manifest.json`
    /// wins over marker-file frontmatter; a bundle with neither yields an
    /// empty manifest.
    pub fn load(dir: &Path, kind: BundleKind) -> Result<Self> {
        let structured = dir.join(kind.structured_manifest());
        if let Some(raw) = read_optional(&structured)? {
            return Self::from_structured_json(&raw, &structured);
        }
        let marker = dir.join(kind.marker_file());
        if let Some(raw) = read_optional(&marker)? {
            return Self::from_frontmatter(&raw, &marker);
        }
        Ok(Self::default())
    }

    /// Parse the YAML frontmatter block of a marker file. A file without a
    /// frontmatter fence yields an empty manifest.
    pub fn from_frontmatter(content: &str, source: &Path) -> Result<Self> {
        let Some(block) = extract_frontmatter(content) else {
            return Ok(Self::default());
        };
        let value: serde_yaml::Value = serde_yaml::from_str(block).map_err(|err| {
            PackError::Validation(format!(
                "frontmatter parse error ({}): {err}",
                source.display()
            ))
        })?;
        Ok(Self::from_yaml(&value))
    }

    /// Parse a structured `manifest.json` document.
    pub fn from_structured_json(raw: &str, source: &Path) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|err| {
            PackError::Validation(format!(
                "manifest parse error ({}): {err}",
                source.display()
            ))
        })?;
        Ok(Self::from_json(&value))
    }

    /// A scalar field coerced to a string, if present.
    #[must_use]
    pub fn string_field(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Scalar(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// A list field; scalar values are treated as a one-element list so
    /// `resources: extra.md` and `resources: [extra.md]` read the same.
    #[must_use]
    pub fn list_field(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(FieldValue::List(items)) => items.clone(),
            Some(FieldValue::Scalar(s)) => vec![s.clone()],
            None => Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn from_yaml(value: &serde_yaml::Value) -> Self {
        let mut fields = BTreeMap::new();
        if let serde_yaml::Value::Mapping(map) = value {
            for (k, v) in map {
                let Some(key) = k.as_str() else { continue };
                if let Some(field) = yaml_field(v) {
                    fields.insert(key.to_string(), field);
                }
            }
        }
        Self { fields }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        let mut fields = BTreeMap::new();
        if let serde_json::Value::Object(map) = value {
            for (k, v) in map {
                if let Some(field) = json_field(v) {
                    fields.insert(k.clone(), field);
                }
            }
        }
        Self { fields }
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_field(value: &serde_yaml::Value) -> Option<FieldValue> {
    match value {
        serde_yaml::Value::Sequence(seq) => Some(FieldValue::List(
            seq.iter().filter_map(yaml_scalar).collect(),
        )),
        other => yaml_scalar(other).map(FieldValue::Scalar),
    }
}

fn json_scalar(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_field(value: &serde_json::Value) -> Option<FieldValue> {
    match value {
        serde_json::Value::Array(items) => Some(FieldValue::List(
            items.iter().filter_map(json_scalar).collect(),
        )),
        other => json_scalar(other).map(FieldValue::Scalar),
    }
}

/// Extract the YAML block between the opening and closing `---` fences.
fn extract_frontmatter(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\r').unwrap_or(rest);
    let rest = rest.strip_prefix('\n')?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    // Unterminated fence: treat the remainder as the block.
    Some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn frontmatter_scalar_and_list_fields() {
        let content = "---\nname: developer\ndescription: Dev workflow\nresources:\n  - ref.md\n  - extra/notes.md\n---\n# Developer\n";
        let manifest =
            ParsedManifest::from_frontmatter(content, Path::new("SKILL.md")).unwrap();
        assert_eq!(manifest.string_field("name"), Some("developer"));
        assert_eq!(manifest.string_field("description"), Some("Dev workflow"));
        assert_eq!(
            manifest.list_field("resources"),
            vec!["ref.md".to_string(), "extra/notes.md".to_string()]
        );
        assert!(manifest.string_field("missing").is_none());
    }

    #[test]
    fn no_frontmatter_is_empty() {
        let manifest =
            ParsedManifest::from_frontmatter("# Just a title\n", Path::new("SKILL.md")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn malformed_frontmatter_is_an_error() {
        let content = "---\n: [unbalanced\n---\n";
        assert!(ParsedManifest::from_frontmatter(content, Path::new("SKILL.md")).is_err());
    }

    #[test]
    fn scalar_coerces_to_single_item_list() {
        let content = "---\nresources: only.md\n---\n";
        let manifest =
            ParsedManifest::from_frontmatter(content, Path::new("SKILL.md")).unwrap();
        assert_eq!(manifest.list_field("resources"), vec!["only.md".to_string()]);
    }

    #[test]
    fn structured_manifest_wins_over_frontmatter() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("SKILL.md"),
            "---\nname: from-frontmatter\n---\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            r#"{"name": "from-structured", "version": "1.2.0"}"#,
        )
        .unwrap();

        let manifest = ParsedManifest::load(dir.path(), BundleKind::Skill).unwrap();
        assert_eq!(manifest.string_field("name"), Some("from-structured"));
        assert_eq!(manifest.string_field("version"), Some("1.2.0"));
    }

    #[test]
    fn numbers_and_bools_coerce_to_strings() {
        let content = "---\nversion: 2\nexperimental: true\n---\n";
        let manifest =
            ParsedManifest::from_frontmatter(content, Path::new("HOOK.md")).unwrap();
        assert_eq!(manifest.string_field("version"), Some("2"));
        assert_eq!(manifest.string_field("experimental"), Some("true"));
    }
}
