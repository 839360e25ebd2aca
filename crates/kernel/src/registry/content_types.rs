//! Content type registry.

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::cache::CacheLayer;
use crate::definitions::ContentTypeSeed;
use crate::models::ContentTypeRecord;

use super::{DefinitionOrigin, REGISTRY_CACHE_TAG};

const CACHE_KEY: &str = "registry:content_types";

/// Registry cache TTL (24 hours); writes invalidate explicitly.
const CACHE_TTL_SECS: u64 = 86_400;

/// A field on a content type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub label: String,
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

/// A content type visible to the rest of the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypeDefinition {
    pub handle: String,
    pub label: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
    pub settings: Value,
    pub origin: DefinitionOrigin,
}

impl From<&ContentTypeSeed> for ContentTypeDefinition {
    fn from(seed: &ContentTypeSeed) -> Self {
        Self {
            handle: seed.handle.clone(),
            label: seed.label.clone(),
            description: seed.description.clone(),
            fields: seed
                .fields
                .iter()
                .map(|f| FieldDefinition {
                    name: f.name.clone(),
                    label: f.label.clone(),
                    kind: f.kind.clone(),
                    required: f.required,
                })
                .collect(),
            settings: seed.settings.clone(),
            origin: DefinitionOrigin::Declared,
        }
    }
}

/// Merged view of declared and user-defined content types.
pub struct ContentTypeRegistry {
    pool: PgPool,
    cache: CacheLayer,

    /// Declared layer, fixed after boot.
    declared: DashMap<String, ContentTypeDefinition>,

    /// Merged view served to callers.
    merged: DashMap<String, ContentTypeDefinition>,
}

impl ContentTypeRegistry {
    pub fn new(pool: PgPool, cache: CacheLayer) -> Self {
        Self {
            pool,
            cache,
            declared: DashMap::new(),
            merged: DashMap::new(),
        }
    }

    /// Add a declared definition. Call before [`ContentTypeRegistry::load`].
    pub fn declare(&self, def: ContentTypeDefinition) {
        self.declared.insert(def.handle.clone(), def);
    }

    /// Seed declared definitions from the boot definitions file.
    pub fn declare_seeds(&self, seeds: &[ContentTypeSeed]) {
        for seed in seeds {
            self.declare(ContentTypeDefinition::from(seed));
        }
    }

    /// Rebuild the merged view: declared layer first, then database rows
    /// shadowing by handle. The database list is served from cache.
    pub async fn load(&self) -> Result<()> {
        let pool = self.pool.clone();
        let db_json = self
            .cache
            .remember(CACHE_KEY, CACHE_TTL_SECS, &[REGISTRY_CACHE_TAG], || async move {
                let records = ContentTypeRecord::list(&pool).await?;
                serde_json::to_string(&records).context("failed to serialize content types")
            })
            .await?;

        let records: Vec<ContentTypeRecord> =
            serde_json::from_str(&db_json).context("failed to parse cached content types")?;

        self.merged.clear();
        for entry in self.declared.iter() {
            self.merged.insert(entry.key().clone(), entry.value().clone());
        }
        for record in records {
            let fields: Vec<FieldDefinition> =
                serde_json::from_value(record.fields.clone()).unwrap_or_default();
            self.merged.insert(
                record.handle.clone(),
                ContentTypeDefinition {
                    handle: record.handle,
                    label: record.label,
                    description: record.description,
                    fields,
                    settings: record.settings,
                    origin: DefinitionOrigin::Database,
                },
            );
        }

        debug!(types = self.merged.len(), "content type registry loaded");
        Ok(())
    }

    pub fn get(&self, handle: &str) -> Option<ContentTypeDefinition> {
        self.merged.get(handle).map(|e| e.value().clone())
    }

    pub fn exists(&self, handle: &str) -> bool {
        self.merged.contains_key(handle)
    }

    /// All content types, sorted by handle.
    pub fn list(&self) -> Vec<ContentTypeDefinition> {
        let mut types: Vec<ContentTypeDefinition> =
            self.merged.iter().map(|e| e.value().clone()).collect();
        types.sort_by(|a, b| a.handle.cmp(&b.handle));
        types
    }

    /// All handles, sorted.
    pub fn handles(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.merged.iter().map(|e| e.key().clone()).collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Create or update a user-defined content type and refresh the
    /// merged view.
    pub async fn save(
        &self,
        handle: &str,
        label: &str,
        description: Option<&str>,
        fields: &[FieldDefinition],
        settings: &Value,
    ) -> Result<ContentTypeDefinition> {
        let fields_json = serde_json::to_value(fields).context("failed to serialize fields")?;

        ContentTypeRecord::upsert(&self.pool, handle, label, description, &fields_json, settings)
            .await?;

        self.cache.invalidate(CACHE_KEY).await;
        self.load().await?;

        info!(handle = %handle, "content type saved");

        self.get(handle)
            .context("content type missing after save")
    }

    /// Delete a user-defined content type and purge its items; both
    /// happen in one transaction. Returns false for unknown handles;
    /// declared types cannot be deleted.
    pub async fn delete(&self, handle: &str) -> Result<bool> {
        let Some(purged) = ContentTypeRecord::delete_with_items(&self.pool, handle).await? else {
            return Ok(false);
        };

        self.cache.invalidate(CACHE_KEY).await;
        self.load().await?;

        info!(handle = %handle, purged_items = purged, "content type deleted");
        Ok(true)
    }
}

impl std::fmt::Debug for ContentTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTypeRegistry")
            .field("types", &self.merged.len())
            .finish()
    }
}
