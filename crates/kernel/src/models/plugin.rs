//! Installed plugin registry rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

/// A plugin known to the database.
///
/// Presence of a row means "installed"; `is_active` tracks activation.
/// Discovery state (manifest on disk) is not stored here.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PluginRecord {
    pub slug: String,
    pub name: String,
    pub version: String,
    pub is_active: bool,
    pub meta: Value,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PluginRecord {
    /// Fetch one plugin by slug.
    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r"
            SELECT slug, name, version, is_active, meta, installed_at, updated_at
            FROM plugins
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plugin")?;

        Ok(row)
    }

    /// List all installed plugins, ordered by slug.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT slug, name, version, is_active, meta, installed_at, updated_at
            FROM plugins
            ORDER BY slug
            ",
        )
        .fetch_all(pool)
        .await
        .context("failed to list plugins")?;

        Ok(rows)
    }

    /// Slugs of all active plugins.
    pub async fn active_slugs(pool: &PgPool) -> Result<Vec<String>> {
        let slugs: Vec<String> =
            sqlx::query_scalar("SELECT slug FROM plugins WHERE is_active = TRUE ORDER BY slug")
                .fetch_all(pool)
                .await
                .context("failed to list active plugins")?;

        Ok(slugs)
    }

    /// Record an installation. Idempotent: an existing row is returned
    /// unchanged rather than overwritten.
    pub async fn install(
        pool: &PgPool,
        slug: &str,
        name: &str,
        version: &str,
        meta: &Value,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r"
            INSERT INTO plugins (slug, name, version, meta)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
            RETURNING slug, name, version, is_active, meta, installed_at, updated_at
            ",
        )
        .bind(slug)
        .bind(name)
        .bind(version)
        .bind(meta)
        .fetch_one(pool)
        .await
        .context("failed to install plugin")?;

        Ok(row)
    }

    /// Flip the activation flag. Returns false when the slug is unknown.
    pub async fn set_active(pool: &PgPool, slug: &str, active: bool) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE plugins
            SET is_active = $2, updated_at = NOW()
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .bind(active)
        .execute(pool)
        .await
        .context("failed to update plugin activation")?;

        Ok(result.rows_affected() > 0)
    }

    /// Refresh a row from the manifest shipped with an update, so name
    /// and metadata track the files on disk.
    pub async fn refresh_from_manifest(
        pool: &PgPool,
        slug: &str,
        name: &str,
        version: &str,
        meta: &Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE plugins
            SET name = $2, version = $3, meta = $4, updated_at = NOW()
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .bind(name)
        .bind(version)
        .bind(meta)
        .execute(pool)
        .await
        .context("failed to refresh plugin from manifest")?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a new installed version after an update.
    pub async fn set_version(pool: &PgPool, slug: &str, version: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE plugins
            SET version = $2, updated_at = NOW()
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .bind(version)
        .execute(pool)
        .await
        .context("failed to update plugin version")?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a plugin row. Migration tracking rows cascade.
    pub async fn delete(pool: &PgPool, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plugins WHERE slug = $1")
            .bind(slug)
            .execute(pool)
            .await
            .context("failed to delete plugin")?;

        Ok(result.rows_affected() > 0)
    }
}
