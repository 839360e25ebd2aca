//! User-defined taxonomy rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaxonomyRecord {
    pub handle: String,
    pub label: String,
    pub description: Option<String>,
    pub hierarchical: bool,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaxonomyRecord {
    /// List all user-defined taxonomies, ordered by handle.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT handle, label, description, hierarchical, settings, created_at, updated_at
            FROM taxonomies
            ORDER BY handle
            ",
        )
        .fetch_all(pool)
        .await
        .context("failed to list taxonomies")?;

        Ok(rows)
    }

    /// Create or update a user-defined taxonomy.
    pub async fn upsert(
        pool: &PgPool,
        handle: &str,
        label: &str,
        description: Option<&str>,
        hierarchical: bool,
        settings: &Value,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r"
            INSERT INTO taxonomies (handle, label, description, hierarchical, settings)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (handle)
            DO UPDATE SET label = $2, description = $3, hierarchical = $4, settings = $5,
                          updated_at = NOW()
            RETURNING handle, label, description, hierarchical, settings, created_at, updated_at
            ",
        )
        .bind(handle)
        .bind(label)
        .bind(description)
        .bind(hierarchical)
        .bind(settings)
        .fetch_one(pool)
        .await
        .context("failed to upsert taxonomy")?;

        Ok(row)
    }

    /// Remove a user-defined taxonomy. Returns false for unknown handles.
    pub async fn delete(pool: &PgPool, handle: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM taxonomies WHERE handle = $1")
            .bind(handle)
            .execute(pool)
            .await
            .context("failed to delete taxonomy")?;

        Ok(result.rows_affected() > 0)
    }
}
