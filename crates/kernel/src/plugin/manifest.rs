//! Plugin manifest (`plugin.toml`) parsing and validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::PluginError;

/// Manifest file name expected in each plugin directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Hook names plugins may subscribe to.
pub const KNOWN_HOOKS: &[&str] = &[
    "notification_sent",
    "notification_read",
    "notification_dismissed",
    "plugin_activated",
    "plugin_deactivated",
    "plugin_updating",
    "plugin_deleted",
];

/// Parsed `plugin.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Directory-safe identifier; must match the directory name.
    pub slug: String,

    /// Human-readable name.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Installed version, e.g. `"1.2.0"`.
    pub version: String,

    /// Remote manifest URL for update checks. Plugins without one cannot
    /// be updated through the update manager.
    #[serde(default)]
    pub update_url: Option<String>,

    #[serde(default)]
    pub migrations: MigrationConfig,

    #[serde(default)]
    pub hooks: HookConfig,
}

/// SQL migrations shipped with a plugin, relative to its directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Forward migrations, applied in listed order on activation.
    #[serde(default)]
    pub files: Vec<String>,

    /// Rollback scripts, parallel to `files`, run in reverse order on
    /// deactivation.
    #[serde(default)]
    pub rollbacks: Vec<String>,
}

/// Hook subscriptions declared by a plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookConfig {
    /// Event names the plugin observes.
    #[serde(default)]
    pub subscribes: Vec<String>,

    /// Dispatch weight shared by all of this plugin's subscriptions.
    #[serde(default)]
    pub weight: i32,
}

/// Check that a slug is safe to embed in a filesystem path.
///
/// Only ASCII alphanumerics, `-`, and `_` are allowed. This is the first
/// line of defense against traversal; path containment is checked again
/// after canonicalization.
pub fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl PluginManifest {
    /// Parse and validate a manifest file.
    pub fn parse(path: &Path) -> Result<Self, PluginError> {
        let slug_hint = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let content = std::fs::read_to_string(path).map_err(|e| PluginError::InvalidManifest {
            slug: slug_hint.clone(),
            details: format!("failed to read {}: {e}", path.display()),
        })?;

        Self::parse_str(&content, &slug_hint)
    }

    /// Parse and validate manifest content.
    pub fn parse_str(content: &str, slug_hint: &str) -> Result<Self, PluginError> {
        let manifest: PluginManifest =
            toml::from_str(content).map_err(|e| PluginError::InvalidManifest {
                slug: slug_hint.to_string(),
                details: e.to_string(),
            })?;

        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), PluginError> {
        if !is_safe_slug(&self.slug) {
            return Err(PluginError::InvalidSlug(self.slug.clone()));
        }

        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidManifest {
                slug: self.slug.clone(),
                details: "name must not be empty".to_string(),
            });
        }

        if self.version.trim().is_empty() {
            return Err(PluginError::InvalidManifest {
                slug: self.slug.clone(),
                details: "version must not be empty".to_string(),
            });
        }

        for hook in &self.hooks.subscribes {
            if !KNOWN_HOOKS.contains(&hook.as_str()) {
                return Err(PluginError::InvalidManifest {
                    slug: self.slug.clone(),
                    details: format!("unknown hook '{hook}'"),
                });
            }
        }

        for file in self
            .migrations
            .files
            .iter()
            .chain(self.migrations.rollbacks.iter())
        {
            if file.contains("..") || Path::new(file).is_absolute() {
                return Err(PluginError::InvalidManifest {
                    slug: self.slug.clone(),
                    details: format!("migration path '{file}' must be relative to the plugin"),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const FULL_MANIFEST: &str = r#"
slug = "blog"
name = "Blog"
description = "Articles with comments"
version = "1.2.0"
update_url = "https://plugins.example.com/blog/manifest.json"

[migrations]
files = ["migrations/0001_posts.sql", "migrations/0002_comments.sql"]
rollbacks = ["migrations/0001_posts.down.sql", "migrations/0002_comments.down.sql"]

[hooks]
subscribes = ["notification_sent", "plugin_activated"]
weight = 5
"#;

    #[test]
    fn parses_full_manifest() {
        let manifest = PluginManifest::parse_str(FULL_MANIFEST, "blog").unwrap();
        assert_eq!(manifest.slug, "blog");
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.migrations.files.len(), 2);
        assert_eq!(manifest.migrations.rollbacks.len(), 2);
        assert_eq!(manifest.hooks.weight, 5);
    }

    #[test]
    fn minimal_manifest_gets_defaults() {
        let manifest =
            PluginManifest::parse_str("slug = \"tiny\"\nname = \"Tiny\"\nversion = \"0.1\"", "tiny")
                .unwrap();
        assert!(manifest.update_url.is_none());
        assert!(manifest.migrations.files.is_empty());
        assert!(manifest.hooks.subscribes.is_empty());
        assert_eq!(manifest.hooks.weight, 0);
    }

    #[test]
    fn rejects_unknown_hook() {
        let content = r#"
slug = "bad"
name = "Bad"
version = "1.0"

[hooks]
subscribes = ["not_a_hook"]
"#;
        let err = PluginManifest::parse_str(content, "bad").unwrap_err();
        assert!(matches!(err, PluginError::InvalidManifest { .. }));
        assert!(err.to_string().contains("not_a_hook"));
    }

    #[test]
    fn rejects_traversal_in_migration_paths() {
        let content = r#"
slug = "bad"
name = "Bad"
version = "1.0"

[migrations]
files = ["../outside.sql"]
"#;
        let err = PluginManifest::parse_str(content, "bad").unwrap_err();
        assert!(matches!(err, PluginError::InvalidManifest { .. }));
    }

    #[test]
    fn rejects_empty_version() {
        let content = "slug = \"x\"\nname = \"X\"\nversion = \"  \"";
        assert!(PluginManifest::parse_str(content, "x").is_err());
    }

    #[test]
    fn slug_character_classes() {
        assert!(is_safe_slug("blog"));
        assert!(is_safe_slug("my-plugin_2"));

        for slug in ["../../etc/passwd", "a/b", "a;b", "a|b", "a&b", "a\0b", ""] {
            assert!(!is_safe_slug(slug), "slug {slug:?} should be rejected");
        }
    }
}
