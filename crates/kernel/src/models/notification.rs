//! Notification storage.
//!
//! A notification row holds the rendered message; per-recipient state
//! (read/dismissed flags and timestamps) lives in `notification_user`.
//! Rows are append-only and removed only by the retention job.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Severity class of a notification, stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }
}

/// A persisted notification, shared by all recipients.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub key: String,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub metadata: Value,
    pub send_email: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification joined with one recipient's state, as served by the feed.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserNotification {
    pub id: Uuid,
    pub key: String,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_dismissed: bool,
    pub dismissed_at: Option<DateTime<Utc>>,
}

/// Fields for a new notification row.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub key: String,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub metadata: Value,
    pub send_email: bool,
}

impl Notification {
    /// Insert a notification and its recipient rows in one transaction.
    pub async fn create_with_recipients(
        pool: &PgPool,
        new: NewNotification,
        recipient_ids: &[Uuid],
    ) -> Result<Self> {
        let mut tx = pool.begin().await.context("failed to begin transaction")?;

        let notification = sqlx::query_as::<_, Notification>(
            r"
            INSERT INTO notifications (id, key, kind, title, content, metadata, send_email)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, key, kind, title, content, metadata, send_email, created_at
            ",
        )
        .bind(Uuid::now_v7())
        .bind(&new.key)
        .bind(new.kind.as_str())
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.metadata)
        .bind(new.send_email)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert notification")?;

        for user_id in recipient_ids {
            sqlx::query(
                r"
                INSERT INTO notification_user (notification_id, user_id)
                VALUES ($1, $2)
                ON CONFLICT (notification_id, user_id) DO NOTHING
                ",
            )
            .bind(notification.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("failed to insert notification recipient")?;
        }

        tx.commit().await.context("failed to commit notification")?;

        Ok(notification)
    }

    /// Fetch one notification as seen by a recipient.
    ///
    /// Returns None when the notification does not exist or was not
    /// addressed to this user.
    pub async fn find_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserNotification>> {
        let row = sqlx::query_as::<_, UserNotification>(
            r"
            SELECT n.id, n.key, n.kind, n.title, n.content, n.metadata, n.created_at,
                   nu.is_read, nu.read_at, nu.is_dismissed, nu.dismissed_at
            FROM notifications n
            JOIN notification_user nu ON nu.notification_id = n.id
            WHERE n.id = $1 AND nu.user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch notification")?;

        Ok(row)
    }

    /// Fetch a recipient's feed, newest first. Dismissed rows are excluded.
    pub async fn feed_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        unread_only: bool,
    ) -> Result<Vec<UserNotification>> {
        let rows = sqlx::query_as::<_, UserNotification>(
            r"
            SELECT n.id, n.key, n.kind, n.title, n.content, n.metadata, n.created_at,
                   nu.is_read, nu.read_at, nu.is_dismissed, nu.dismissed_at
            FROM notifications n
            JOIN notification_user nu ON nu.notification_id = n.id
            WHERE nu.user_id = $1
              AND nu.is_dismissed = FALSE
              AND (NOT $3 OR nu.is_read = FALSE)
            ORDER BY n.created_at DESC
            LIMIT $2
            ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(unread_only)
        .fetch_all(pool)
        .await
        .context("failed to fetch notification feed")?;

        Ok(rows)
    }

    /// Mark one notification read for a recipient.
    ///
    /// Idempotent: repeated calls succeed and `read_at` keeps its first
    /// value. Returns false when no recipient row exists.
    pub async fn mark_read(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE notification_user
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE notification_id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to mark notification read")?;

        Ok(result.rows_affected() > 0)
    }

    /// Dismiss one notification for a recipient. Idempotent like
    /// [`Notification::mark_read`].
    pub async fn dismiss(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE notification_user
            SET is_dismissed = TRUE, dismissed_at = COALESCE(dismissed_at, NOW())
            WHERE notification_id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to dismiss notification")?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark every unread notification read. Returns the number of rows
    /// actually changed, so already-read rows do not count.
    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE notification_user
            SET is_read = TRUE, read_at = NOW()
            WHERE user_id = $1 AND is_read = FALSE
            ",
        )
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to mark all notifications read")?;

        Ok(result.rows_affected())
    }

    /// Dismiss every non-dismissed notification. Returns the number of
    /// rows actually changed.
    pub async fn dismiss_all(pool: &PgPool, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE notification_user
            SET is_dismissed = TRUE, dismissed_at = NOW()
            WHERE user_id = $1 AND is_dismissed = FALSE
            ",
        )
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to dismiss all notifications")?;

        Ok(result.rows_affected())
    }

    /// Count unread, non-dismissed notifications for a recipient.
    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM notification_user
            WHERE user_id = $1 AND is_read = FALSE AND is_dismissed = FALSE
            ",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("failed to count unread notifications")?;

        Ok(count)
    }

    /// Delete notifications older than `days`. Recipient rows cascade.
    /// Used by the retention job.
    pub async fn delete_older_than(pool: &PgPool, days: i64) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM notifications
            WHERE created_at < NOW() - ($1 * INTERVAL '1 day')
            ",
        )
        .bind(days)
        .execute(pool)
        .await
        .context("failed to delete old notifications")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_serde() {
        let kind: NotificationKind = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(kind, NotificationKind::Warning);
        assert_eq!(kind.as_str(), "warning");
    }

    #[test]
    fn kind_defaults_to_info() {
        assert_eq!(NotificationKind::default(), NotificationKind::Info);
    }
}
