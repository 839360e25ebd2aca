//! Notification type definitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::definitions::NotificationSeed;
use crate::hook::HookBus;
use crate::models::NotificationKind;

/// Default template for a notification type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDefinition {
    /// Dotted identifier, e.g. `"comment.reply"`.
    pub key: String,

    pub title: String,

    pub content: String,

    pub kind: NotificationKind,

    /// Whether sends of this type also enqueue email jobs by default.
    pub send_email: bool,

    /// Structured defaults merged under any per-send metadata.
    pub metadata: Value,
}

impl NotificationDefinition {
    pub fn new(key: &str, title: &str) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            content: String::new(),
            kind: NotificationKind::Info,
            send_email: false,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }
}

impl From<&NotificationSeed> for NotificationDefinition {
    fn from(seed: &NotificationSeed) -> Self {
        Self {
            key: seed.key.clone(),
            title: seed.title.clone(),
            content: seed.content.clone(),
            kind: seed.kind,
            send_email: seed.send_email,
            metadata: seed.metadata.clone(),
        }
    }
}

/// In-memory registry of notification definitions.
///
/// Sends with an unregistered key still work: [`NotificationRegistry::resolve`]
/// falls back to a bare definition so callers can rely on overrides alone.
pub struct NotificationRegistry {
    definitions: RwLock<BTreeMap<String, NotificationDefinition>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build the registry from boot seeds, then let hook filters adjust
    /// the definition map.
    pub fn from_seeds(seeds: &[NotificationSeed], hooks: &Arc<HookBus>) -> Self {
        let mut defs = BTreeMap::new();
        for seed in seeds {
            defs.insert(seed.key.clone(), NotificationDefinition::from(seed));
        }

        hooks.apply_definition_filters(&mut defs);

        debug!(definitions = defs.len(), "notification registry built");

        Self {
            definitions: RwLock::new(defs),
        }
    }

    /// Register or replace a definition at runtime.
    pub fn register(&self, def: NotificationDefinition) {
        self.definitions.write().insert(def.key.clone(), def);
    }

    /// Look up a definition by key.
    pub fn get(&self, key: &str) -> Option<NotificationDefinition> {
        self.definitions.read().get(key).cloned()
    }

    /// Resolve a key to a definition, falling back to an untitled stub
    /// for unregistered keys.
    pub fn resolve(&self, key: &str) -> NotificationDefinition {
        self.get(key)
            .unwrap_or_else(|| NotificationDefinition::new(key, key))
    }

    /// All definitions, sorted by key.
    pub fn list(&self) -> Vec<NotificationDefinition> {
        self.definitions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

impl Default for NotificationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_for_unknown_keys() {
        let registry = NotificationRegistry::new();
        let def = registry.resolve("mystery.key");
        assert_eq!(def.key, "mystery.key");
        assert_eq!(def.title, "mystery.key");
        assert!(!def.send_email);
    }

    #[test]
    fn filters_can_extend_the_seeded_map() {
        let hooks = Arc::new(HookBus::new());
        hooks.add_definition_filter("forum", 0, |defs| {
            defs.insert(
                "forum.mention".to_string(),
                NotificationDefinition::new("forum.mention", "You were mentioned"),
            );
        });

        let seeds = vec![NotificationSeed {
            key: "comment.reply".to_string(),
            title: "New reply".to_string(),
            content: String::new(),
            kind: NotificationKind::Info,
            send_email: false,
            metadata: serde_json::json!({}),
        }];

        let registry = NotificationRegistry::from_seeds(&seeds, &hooks);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("forum.mention").is_some());
        assert!(registry.get("comment.reply").is_some());
    }

    #[test]
    fn register_replaces_existing_definition() {
        let registry = NotificationRegistry::new();
        registry.register(NotificationDefinition::new("a.b", "first"));
        registry.register(NotificationDefinition::new("a.b", "second"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("a.b").title, "second");
    }
}
