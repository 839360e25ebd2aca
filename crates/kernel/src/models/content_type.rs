//! User-defined content type rows.
//!
//! Config-declared content types never touch this table; only types
//! created through the API are stored, and they shadow config-declared
//! types with the same handle.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentTypeRecord {
    pub handle: String,
    pub label: String,
    pub description: Option<String>,
    pub fields: Value,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentTypeRecord {
    /// List all user-defined content types, ordered by handle.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT handle, label, description, fields, settings, created_at, updated_at
            FROM content_types
            ORDER BY handle
            ",
        )
        .fetch_all(pool)
        .await
        .context("failed to list content types")?;

        Ok(rows)
    }

    /// Create or update a user-defined content type.
    pub async fn upsert(
        pool: &PgPool,
        handle: &str,
        label: &str,
        description: Option<&str>,
        fields: &Value,
        settings: &Value,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r"
            INSERT INTO content_types (handle, label, description, fields, settings)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (handle)
            DO UPDATE SET label = $2, description = $3, fields = $4, settings = $5,
                          updated_at = NOW()
            RETURNING handle, label, description, fields, settings, created_at, updated_at
            ",
        )
        .bind(handle)
        .bind(label)
        .bind(description)
        .bind(fields)
        .bind(settings)
        .fetch_one(pool)
        .await
        .context("failed to upsert content type")?;

        Ok(row)
    }

    /// Remove a user-defined content type together with all of its
    /// items, in one transaction so a failed purge leaves the row in
    /// place. Returns `None` for unknown handles, otherwise the number
    /// of items purged.
    pub async fn delete_with_items(pool: &PgPool, handle: &str) -> Result<Option<u64>> {
        let mut tx = pool.begin().await.context("failed to begin transaction")?;

        let deleted = sqlx::query("DELETE FROM content_types WHERE handle = $1")
            .bind(handle)
            .execute(&mut *tx)
            .await
            .context("failed to delete content type")?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        let purged = sqlx::query("DELETE FROM items WHERE content_type = $1")
            .bind(handle)
            .execute(&mut *tx)
            .await
            .context("failed to purge items of content type")?;

        tx.commit()
            .await
            .context("failed to commit content type delete")?;

        Ok(Some(purged.rows_affected()))
    }
}
