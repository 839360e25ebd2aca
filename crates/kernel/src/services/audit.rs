//! Audit trail.
//!
//! Records notification sends, plugin lifecycle transitions, and
//! registry changes. Entries are queried by operators, not by the
//! application, and are pruned by the retention job.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// One audit entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Writes and prunes the audit trail.
#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an auditable action.
    pub async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        user_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO audit_log (id, action, entity_type, entity_id, user_id, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(Uuid::now_v7())
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(user_id)
        .bind(&details)
        .execute(&self.pool)
        .await
        .context("failed to write audit entry")?;

        debug!(
            action = %action,
            entity_type = %entity_type,
            entity_id = %entity_id,
            "audit entry recorded"
        );

        Ok(())
    }

    /// Most recent entries, optionally filtered by entity type.
    pub async fn recent(&self, entity_type: Option<&str>, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditEntry>(
            r"
            SELECT id, action, entity_type, entity_id, user_id, details, created_at
            FROM audit_log
            WHERE ($1::text IS NULL OR entity_type = $1)
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(entity_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch audit entries")?;

        Ok(rows)
    }

    /// Delete entries older than the retention period.
    pub async fn cleanup(&self, retention_days: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM audit_log WHERE created_at < NOW() - ($1 * INTERVAL '1 day')",
        )
        .bind(retention_days)
        .execute(&self.pool)
        .await
        .context("failed to clean up audit log")?;

        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService").finish()
    }
}
