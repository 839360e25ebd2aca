//! Boot definitions file.
//!
//! A TOML file (`DEFINITIONS_FILE`, default `./definitions.toml`) declares
//! the built-in notification types, content types, and taxonomies seeded
//! into the registries at startup. A missing file is not an error; the
//! registries then start from database rows alone.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::models::NotificationKind;

/// Root of the definitions file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub notifications: Vec<NotificationSeed>,

    #[serde(default)]
    pub content_types: Vec<ContentTypeSeed>,

    #[serde(default)]
    pub taxonomies: Vec<TaxonomySeed>,
}

/// A declared notification type.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSeed {
    /// Dotted identifier, e.g. `"comment.reply"`.
    pub key: String,

    pub title: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub kind: NotificationKind,

    #[serde(default)]
    pub send_email: bool,

    /// Arbitrary structured defaults merged into each send.
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

/// A declared content type.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentTypeSeed {
    pub handle: String,

    pub label: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldSeed>,

    #[serde(default = "empty_object")]
    pub settings: Value,
}

/// A field on a declared content type.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSeed {
    pub name: String,

    pub label: String,

    /// Field kind, e.g. `"text"`, `"integer"`, `"reference"`.
    pub kind: String,

    #[serde(default)]
    pub required: bool,
}

/// A declared taxonomy.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomySeed {
    pub handle: String,

    pub label: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub hierarchical: bool,

    #[serde(default = "empty_object")]
    pub settings: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Load definitions from disk. A missing file yields empty definitions.
pub fn load(path: &Path) -> Result<Definitions> {
    if !path.exists() {
        info!(path = %path.display(), "no definitions file, starting with empty registries");
        return Ok(Definitions::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read definitions file {}", path.display()))?;

    let defs: Definitions = toml::from_str(&content)
        .with_context(|| format!("failed to parse definitions file {}", path.display()))?;

    info!(
        path = %path.display(),
        notifications = defs.notifications.len(),
        content_types = defs.content_types.len(),
        taxonomies = defs.taxonomies.len(),
        "loaded boot definitions"
    );

    Ok(defs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_yields_empty_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let defs = load(&dir.path().join("definitions.toml")).unwrap();
        assert!(defs.notifications.is_empty());
        assert!(defs.content_types.is_empty());
        assert!(defs.taxonomies.is_empty());
    }

    #[test]
    fn parses_full_definitions_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("definitions.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[[notifications]]
key = "comment.reply"
title = "New reply"
content = "Someone replied to your comment."
kind = "info"
send_email = true

[notifications.metadata]
icon = "reply"

[[content_types]]
handle = "article"
label = "Article"

[[content_types.fields]]
name = "body"
label = "Body"
kind = "text"
required = true

[[taxonomies]]
handle = "tags"
label = "Tags"
hierarchical = false
"#
        )
        .unwrap();

        let defs = load(&path).unwrap();

        assert_eq!(defs.notifications.len(), 1);
        let seed = &defs.notifications[0];
        assert_eq!(seed.key, "comment.reply");
        assert!(seed.send_email);
        assert_eq!(seed.metadata["icon"], "reply");

        assert_eq!(defs.content_types[0].fields[0].name, "body");
        assert!(defs.content_types[0].fields[0].required);
        assert!(!defs.taxonomies[0].hierarchical);
    }

    #[test]
    fn seed_defaults_apply() {
        let defs: Definitions = toml::from_str(
            r#"
[[notifications]]
key = "system.note"
title = "Note"
"#,
        )
        .unwrap();

        let seed = &defs.notifications[0];
        assert_eq!(seed.content, "");
        assert_eq!(seed.kind, NotificationKind::Info);
        assert!(!seed.send_email);
        assert!(seed.metadata.as_object().unwrap().is_empty());
    }
}
