//! Plugin lifecycle manager.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::RwLock;
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::cache::CacheLayer;
use crate::hook::{HookBus, HookEvent};
use crate::models::PluginRecord;

use super::error::PluginError;
use super::manifest::{is_safe_slug, PluginManifest, MANIFEST_FILE};
use super::migration;

/// Cache key for the discovery scan.
const DISCOVER_CACHE_KEY: &str = "plugins:discovered";

/// Cache tag for everything plugin-related.
pub const PLUGINS_CACHE_TAG: &str = "plugins";

/// Discovery cache TTL (5 minutes).
const DISCOVER_TTL_SECS: u64 = 300;

/// What a deactivation did.
#[derive(Debug, Default)]
pub struct DeactivationReport {
    /// Rollback scripts that ran.
    pub rolled_back: Vec<String>,

    /// Rollback failures; the plugin is inactive regardless.
    pub rollback_errors: Vec<String>,
}

/// Manages plugin discovery and the installed/active lifecycle.
pub struct PluginManager {
    pool: PgPool,
    cache: CacheLayer,
    hooks: Arc<HookBus>,
    plugins_dir: PathBuf,
    active: RwLock<HashSet<String>>,
}

impl PluginManager {
    pub fn new(pool: PgPool, cache: CacheLayer, hooks: Arc<HookBus>, plugins_dir: PathBuf) -> Self {
        Self {
            pool,
            cache,
            hooks,
            plugins_dir,
            active: RwLock::new(HashSet::new()),
        }
    }

    /// Populate the in-memory active set from the database. Called once
    /// at boot.
    pub async fn load_active(&self) -> Result<(), PluginError> {
        let slugs = PluginRecord::active_slugs(&self.pool)
            .await
            .context("failed to load active plugins")?;

        info!(active = slugs.len(), "loaded active plugin set");
        *self.active.write() = slugs.into_iter().collect();
        Ok(())
    }

    /// Whether a plugin is currently active.
    pub fn is_active(&self, slug: &str) -> bool {
        self.active.read().contains(slug)
    }

    /// Snapshot of active slugs, sorted.
    pub fn active_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.active.read().iter().cloned().collect();
        slugs.sort();
        slugs
    }

    /// Resolve a slug to its directory, or None when the slug is unsafe,
    /// escapes the plugins root, or does not exist.
    ///
    /// The character-class check rejects traversal in the slug itself;
    /// the canonicalized containment check catches symlinks pointing
    /// outside the root.
    pub fn plugin_dir(&self, slug: &str) -> Option<PathBuf> {
        if !is_safe_slug(slug) {
            return None;
        }

        let root = self.plugins_dir.canonicalize().ok()?;
        let dir = root.join(slug).canonicalize().ok()?;

        if !dir.starts_with(&root) {
            warn!(slug = %slug, "plugin directory escapes plugins root");
            return None;
        }

        dir.is_dir().then_some(dir)
    }

    /// Scan the plugins directory for valid manifests.
    ///
    /// Results are cached; directories with missing or invalid manifests
    /// are logged and skipped, as is any manifest whose slug does not
    /// match its directory name.
    pub async fn discover(&self) -> Result<BTreeMap<String, PluginManifest>, PluginError> {
        if let Some(cached) = self.cache.get(DISCOVER_CACHE_KEY).await {
            if let Ok(manifests) = serde_json::from_str(&cached) {
                debug!("plugin discovery served from cache");
                return Ok(manifests);
            }
        }

        let manifests = scan_plugins_dir(&self.plugins_dir);

        if let Ok(serialized) = serde_json::to_string(&manifests) {
            self.cache
                .set(
                    DISCOVER_CACHE_KEY,
                    &serialized,
                    DISCOVER_TTL_SECS,
                    &[PLUGINS_CACHE_TAG],
                )
                .await;
        }

        Ok(manifests)
    }

    /// Load one plugin's manifest from disk. None when the slug is
    /// invalid, missing, or the manifest fails to parse.
    pub fn get_plugin(&self, slug: &str) -> Option<PluginManifest> {
        let dir = self.plugin_dir(slug)?;
        match PluginManifest::parse(&dir.join(MANIFEST_FILE)) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(slug = %slug, error = %e, "failed to load plugin manifest");
                None
            }
        }
    }

    /// Record a discovered plugin as installed. Idempotent.
    ///
    /// The manifest's slug must match the directory name, same as the
    /// discovery scan; a mismatched manifest would register a row whose
    /// slug resolves to no directory.
    pub async fn install(&self, slug: &str) -> Result<PluginRecord, PluginError> {
        let dir = self
            .plugin_dir(slug)
            .ok_or_else(|| PluginError::NotFoundOnDisk(slug.to_string()))?;

        let manifest = PluginManifest::parse(&dir.join(MANIFEST_FILE))?;

        if manifest.slug != slug {
            return Err(PluginError::InvalidManifest {
                slug: slug.to_string(),
                details: format!(
                    "manifest slug '{}' does not match directory name",
                    manifest.slug
                ),
            });
        }

        let meta = json!({
            "description": manifest.description,
            "update_url": manifest.update_url,
        });

        let record = PluginRecord::install(
            &self.pool,
            &manifest.slug,
            &manifest.name,
            &manifest.version,
            &meta,
        )
        .await
        .context("failed to record plugin installation")?;

        self.cache.invalidate_tag(PLUGINS_CACHE_TAG).await;

        info!(slug = %slug, version = %record.version, "plugin installed");
        Ok(record)
    }

    /// Activate an installed plugin: run its forward migrations, flip
    /// the flag, and emit the activation hook. Re-activating an active
    /// plugin succeeds without re-running migrations.
    pub async fn activate(&self, slug: &str) -> Result<Vec<String>, PluginError> {
        let record = PluginRecord::find_by_slug(&self.pool, slug)
            .await
            .context("failed to look up plugin")?
            .ok_or_else(|| PluginError::NotInstalled(slug.to_string()))?;

        if record.is_active {
            debug!(slug = %slug, "plugin already active");
            return Ok(Vec::new());
        }

        let dir = self
            .plugin_dir(slug)
            .ok_or_else(|| PluginError::NotFoundOnDisk(slug.to_string()))?;
        let manifest = PluginManifest::parse(&dir.join(MANIFEST_FILE))?;

        let applied = migration::run_forward(&self.pool, &manifest, &dir).await?;

        PluginRecord::set_active(&self.pool, slug, true)
            .await
            .context("failed to mark plugin active")?;
        self.active.write().insert(slug.to_string());

        self.cache.invalidate_tag(PLUGINS_CACHE_TAG).await;

        self.hooks.emit(&HookEvent::PluginActivated {
            slug: slug.to_string(),
        });

        info!(slug = %slug, migrations = applied.len(), "plugin activated");
        Ok(applied)
    }

    /// Deactivate a plugin: run its rollbacks best-effort, flip the
    /// flag, and emit the deactivation hook. The plugin ends up inactive
    /// even when rollbacks fail; failures are reported to the caller.
    pub async fn deactivate(&self, slug: &str) -> Result<DeactivationReport, PluginError> {
        let record = PluginRecord::find_by_slug(&self.pool, slug)
            .await
            .context("failed to look up plugin")?
            .ok_or_else(|| PluginError::NotInstalled(slug.to_string()))?;

        let mut report = DeactivationReport::default();

        if !record.is_active {
            debug!(slug = %slug, "plugin already inactive");
            return Ok(report);
        }

        // Rollbacks need the files on disk; a plugin deleted from disk
        // can still be deactivated, its schema left in place.
        if let Some(dir) = self.plugin_dir(slug) {
            match PluginManifest::parse(&dir.join(MANIFEST_FILE)) {
                Ok(manifest) => {
                    let outcome = migration::run_rollbacks(&self.pool, &manifest, &dir).await?;
                    report.rolled_back = outcome.rolled_back;
                    report.rollback_errors = outcome.errors;
                }
                Err(e) => {
                    warn!(slug = %slug, error = %e, "manifest unreadable, skipping rollbacks");
                    report.rollback_errors.push(e.to_string());
                }
            }
        } else {
            warn!(slug = %slug, "plugin missing on disk, skipping rollbacks");
        }

        PluginRecord::set_active(&self.pool, slug, false)
            .await
            .context("failed to mark plugin inactive")?;
        self.active.write().remove(slug);

        self.cache.invalidate_tag(PLUGINS_CACHE_TAG).await;

        self.hooks.emit(&HookEvent::PluginDeactivated {
            slug: slug.to_string(),
        });

        info!(
            slug = %slug,
            rolled_back = report.rolled_back.len(),
            rollback_errors = report.rollback_errors.len(),
            "plugin deactivated"
        );
        Ok(report)
    }

    /// Delete a plugin: deactivate if active, drop its registry row, and
    /// optionally remove its files.
    pub async fn delete(&self, slug: &str, remove_files: bool) -> Result<(), PluginError> {
        let record = PluginRecord::find_by_slug(&self.pool, slug)
            .await
            .context("failed to look up plugin")?
            .ok_or_else(|| PluginError::NotInstalled(slug.to_string()))?;

        if record.is_active {
            let report = self.deactivate(slug).await?;
            for err in &report.rollback_errors {
                warn!(slug = %slug, error = %err, "rollback error during delete");
            }
        }

        PluginRecord::delete(&self.pool, slug)
            .await
            .context("failed to delete plugin record")?;

        if remove_files {
            if let Some(dir) = self.plugin_dir(slug) {
                std::fs::remove_dir_all(&dir).map_err(|e| PluginError::RemoveFailed {
                    slug: slug.to_string(),
                    details: e.to_string(),
                })?;
            }
        }

        self.cache.invalidate_tag(PLUGINS_CACHE_TAG).await;

        self.hooks.emit(&HookEvent::PluginDeleted {
            slug: slug.to_string(),
        });

        info!(slug = %slug, removed_files = remove_files, "plugin deleted");
        Ok(())
    }

    /// Invalidate cached discovery results. Called after updates change
    /// files on disk.
    pub async fn invalidate_discovery(&self) {
        self.cache.invalidate_tag(PLUGINS_CACHE_TAG).await;
    }

    pub fn plugins_root(&self) -> &Path {
        &self.plugins_dir
    }
}

/// Scan a plugins directory for valid manifests.
///
/// Directories with missing or invalid manifests are logged and skipped,
/// as is any manifest whose slug does not match its directory name.
pub fn scan_plugins_dir(dir: &Path) -> BTreeMap<String, PluginManifest> {
    let mut manifests = BTreeMap::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read plugins directory");
            return manifests;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            debug!(dir = %path.display(), "skipping directory without manifest");
            continue;
        }

        let manifest = match PluginManifest::parse(&manifest_path) {
            Ok(m) => m,
            Err(e) => {
                warn!(dir = %path.display(), error = %e, "skipping invalid plugin manifest");
                continue;
            }
        };

        let dir_name = entry.file_name().to_string_lossy().to_string();
        if manifest.slug != dir_name {
            warn!(
                dir = %dir_name,
                slug = %manifest.slug,
                "skipping plugin: manifest slug does not match directory"
            );
            continue;
        }

        manifests.insert(manifest.slug.clone(), manifest);
    }

    debug!(found = manifests.len(), "plugin discovery scan complete");
    manifests
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins_dir", &self.plugins_dir)
            .field("active", &self.active.read().len())
            .finish()
    }
}
