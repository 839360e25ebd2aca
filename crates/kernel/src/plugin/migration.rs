//! Plugin migration runner.
//!
//! Reads SQL files declared in a plugin's manifest, tracks applied ones
//! in `plugin_migrations`, and runs pending forward migrations inside a
//! single per-plugin transaction. Rollbacks run best-effort on
//! deactivation, each in its own transaction.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::{debug, info, warn};

use super::error::PluginError;
use super::manifest::PluginManifest;

/// Names of migrations already applied for a plugin, in applied order.
pub async fn applied_migrations(pool: &PgPool, slug: &str) -> Result<Vec<String>> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT migration FROM plugin_migrations WHERE plugin = $1 ORDER BY applied_at, migration",
    )
    .bind(slug)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Run pending forward migrations for one plugin.
///
/// All pending migrations run in a single transaction, so a failure
/// leaves the plugin's schema where the previous activation left it.
/// Returns the newly applied migration names.
pub async fn run_forward(
    pool: &PgPool,
    manifest: &PluginManifest,
    plugin_dir: &Path,
) -> Result<Vec<String>> {
    if manifest.migrations.files.is_empty() {
        return Ok(Vec::new());
    }

    let applied = applied_migrations(pool, &manifest.slug).await?;
    let applied_set: HashSet<&str> = applied.iter().map(String::as_str).collect();

    let pending: Vec<&str> = manifest
        .migrations
        .files
        .iter()
        .map(String::as_str)
        .filter(|f| !applied_set.contains(*f))
        .collect();

    if pending.is_empty() {
        debug!(plugin = %manifest.slug, "no pending migrations");
        return Ok(Vec::new());
    }

    info!(plugin = %manifest.slug, count = pending.len(), "running pending migrations");

    let mut tx = pool.begin().await?;
    let mut newly_applied = Vec::new();

    for file in &pending {
        let sql_path = plugin_dir.join(file);

        if !sql_path.exists() {
            return Err(PluginError::MigrationFileNotFound {
                plugin: manifest.slug.clone(),
                path: sql_path.display().to_string(),
            }
            .into());
        }

        let sql = std::fs::read_to_string(&sql_path).map_err(|e| PluginError::MigrationFailed {
            plugin: manifest.slug.clone(),
            migration: (*file).to_string(),
            details: format!("failed to read file: {e}"),
        })?;

        debug!(plugin = %manifest.slug, migration = %file, "executing migration");

        // raw_sql rather than query(): migration files hold multiple
        // statements, and prepared statements take only one.
        tx.as_mut()
            .execute(sqlx::raw_sql(&sql))
            .await
            .map_err(|e| PluginError::MigrationFailed {
                plugin: manifest.slug.clone(),
                migration: (*file).to_string(),
                details: e.to_string(),
            })?;

        sqlx::query("INSERT INTO plugin_migrations (plugin, migration) VALUES ($1, $2)")
            .bind(&manifest.slug)
            .bind(*file)
            .execute(tx.as_mut())
            .await?;

        newly_applied.push((*file).to_string());
    }

    tx.commit().await?;

    info!(plugin = %manifest.slug, applied = newly_applied.len(), "migrations complete");

    Ok(newly_applied)
}

/// Outcome of a rollback pass.
#[derive(Debug, Default)]
pub struct RollbackOutcome {
    /// Rollback files that ran successfully.
    pub rolled_back: Vec<String>,

    /// Human-readable descriptions of failures, in occurrence order.
    pub errors: Vec<String>,
}

/// Run rollback scripts for every applied migration, in reverse order.
///
/// Best-effort: each rollback runs in its own transaction and a failure
/// is recorded, not fatal, so one broken script cannot strand the rest.
/// Tracking rows are removed for each successful rollback.
pub async fn run_rollbacks(
    pool: &PgPool,
    manifest: &PluginManifest,
    plugin_dir: &Path,
) -> Result<RollbackOutcome> {
    let applied = applied_migrations(pool, &manifest.slug).await?;
    let applied_set: HashSet<&str> = applied.iter().map(String::as_str).collect();

    let mut outcome = RollbackOutcome::default();

    // Rollbacks pair positionally with forward files; walk them together
    // in reverse so later schema changes unwind first.
    let pairs: Vec<(&String, &String)> = manifest
        .migrations
        .files
        .iter()
        .zip(manifest.migrations.rollbacks.iter())
        .rev()
        .collect();

    for (forward, rollback) in pairs {
        if !applied_set.contains(forward.as_str()) {
            continue;
        }

        if let Err(e) = run_one_rollback(pool, &manifest.slug, forward, rollback, plugin_dir).await
        {
            warn!(plugin = %manifest.slug, rollback = %rollback, error = %e, "rollback failed");
            outcome.errors.push(format!("{rollback}: {e}"));
        } else {
            outcome.rolled_back.push(rollback.clone());
        }
    }

    if !outcome.rolled_back.is_empty() {
        info!(
            plugin = %manifest.slug,
            rolled_back = outcome.rolled_back.len(),
            failed = outcome.errors.len(),
            "rollbacks complete"
        );
    }

    Ok(outcome)
}

async fn run_one_rollback(
    pool: &PgPool,
    slug: &str,
    forward: &str,
    rollback: &str,
    plugin_dir: &Path,
) -> Result<()> {
    let sql_path = plugin_dir.join(rollback);
    let sql = std::fs::read_to_string(&sql_path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", sql_path.display()))?;

    let mut tx = pool.begin().await?;

    tx.as_mut().execute(sqlx::raw_sql(&sql)).await?;

    sqlx::query("DELETE FROM plugin_migrations WHERE plugin = $1 AND migration = $2")
        .bind(slug)
        .bind(forward)
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;
    Ok(())
}
