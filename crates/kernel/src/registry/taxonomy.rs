//! Taxonomy registry.

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::cache::CacheLayer;
use crate::definitions::TaxonomySeed;
use crate::models::TaxonomyRecord;

use super::{DefinitionOrigin, REGISTRY_CACHE_TAG};

const CACHE_KEY: &str = "registry:taxonomies";

const CACHE_TTL_SECS: u64 = 86_400;

/// A taxonomy visible to the rest of the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyDefinition {
    pub handle: String,
    pub label: String,
    pub description: Option<String>,
    pub hierarchical: bool,
    pub settings: Value,
    pub origin: DefinitionOrigin,
}

impl From<&TaxonomySeed> for TaxonomyDefinition {
    fn from(seed: &TaxonomySeed) -> Self {
        Self {
            handle: seed.handle.clone(),
            label: seed.label.clone(),
            description: seed.description.clone(),
            hierarchical: seed.hierarchical,
            settings: seed.settings.clone(),
            origin: DefinitionOrigin::Declared,
        }
    }
}

/// Merged view of declared and user-defined taxonomies. Same layering
/// as the content type registry: database rows shadow declared handles.
pub struct TaxonomyRegistry {
    pool: PgPool,
    cache: CacheLayer,
    declared: DashMap<String, TaxonomyDefinition>,
    merged: DashMap<String, TaxonomyDefinition>,
}

impl TaxonomyRegistry {
    pub fn new(pool: PgPool, cache: CacheLayer) -> Self {
        Self {
            pool,
            cache,
            declared: DashMap::new(),
            merged: DashMap::new(),
        }
    }

    pub fn declare(&self, def: TaxonomyDefinition) {
        self.declared.insert(def.handle.clone(), def);
    }

    pub fn declare_seeds(&self, seeds: &[TaxonomySeed]) {
        for seed in seeds {
            self.declare(TaxonomyDefinition::from(seed));
        }
    }

    /// Rebuild the merged view from the declared layer and (cached)
    /// database rows.
    pub async fn load(&self) -> Result<()> {
        let pool = self.pool.clone();
        let db_json = self
            .cache
            .remember(CACHE_KEY, CACHE_TTL_SECS, &[REGISTRY_CACHE_TAG], || async move {
                let records = TaxonomyRecord::list(&pool).await?;
                serde_json::to_string(&records).context("failed to serialize taxonomies")
            })
            .await?;

        let records: Vec<TaxonomyRecord> =
            serde_json::from_str(&db_json).context("failed to parse cached taxonomies")?;

        self.merged.clear();
        for entry in self.declared.iter() {
            self.merged.insert(entry.key().clone(), entry.value().clone());
        }
        for record in records {
            self.merged.insert(
                record.handle.clone(),
                TaxonomyDefinition {
                    handle: record.handle,
                    label: record.label,
                    description: record.description,
                    hierarchical: record.hierarchical,
                    settings: record.settings,
                    origin: DefinitionOrigin::Database,
                },
            );
        }

        debug!(taxonomies = self.merged.len(), "taxonomy registry loaded");
        Ok(())
    }

    pub fn get(&self, handle: &str) -> Option<TaxonomyDefinition> {
        self.merged.get(handle).map(|e| e.value().clone())
    }

    pub fn exists(&self, handle: &str) -> bool {
        self.merged.contains_key(handle)
    }

    /// All taxonomies, sorted by handle.
    pub fn list(&self) -> Vec<TaxonomyDefinition> {
        let mut taxonomies: Vec<TaxonomyDefinition> =
            self.merged.iter().map(|e| e.value().clone()).collect();
        taxonomies.sort_by(|a, b| a.handle.cmp(&b.handle));
        taxonomies
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

    /// Create or update a user-defined taxonomy and refresh the merged
    /// view.
    pub async fn save(
        &self,
        handle: &str,
        label: &str,
        description: Option<&str>,
        hierarchical: bool,
        settings: &Value,
    ) -> Result<TaxonomyDefinition> {
        TaxonomyRecord::upsert(&self.pool, handle, label, description, hierarchical, settings)
            .await?;

        self.cache.invalidate(CACHE_KEY).await;
        self.load().await?;

        info!(handle = %handle, "taxonomy saved");

        self.get(handle).context("taxonomy missing after save")
    }

    /// Delete a user-defined taxonomy. Returns false for unknown
    /// handles; declared taxonomies cannot be deleted.
    pub async fn delete(&self, handle: &str) -> Result<bool> {
        let deleted = TaxonomyRecord::delete(&self.pool, handle).await?;
        if !deleted {
            return Ok(false);
        }

        self.cache.invalidate(CACHE_KEY).await;
        self.load().await?;

        info!(handle = %handle, "taxonomy deleted");
        Ok(true)
    }
}

impl std::fmt::Debug for TaxonomyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxonomyRegistry")
            .field("taxonomies", &self.merged.len())
            .finish()
    }
}
