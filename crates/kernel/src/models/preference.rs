//! Per-user notification preferences.
//!
//! Preferences are default-open: a missing row means both in-app and
//! email delivery are enabled for that notification type.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// One user's preference for one notification type.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationPreference {
    pub user_id: Uuid,
    pub notification_type: String,
    pub is_enabled: bool,
    pub email_enabled: bool,
}

impl NotificationPreference {
    /// The virtual row returned when no preference has been stored.
    pub fn default_for(user_id: Uuid, notification_type: &str) -> Self {
        Self {
            user_id,
            notification_type: notification_type.to_string(),
            is_enabled: true,
            email_enabled: true,
        }
    }

    /// Fetch a stored preference, if any.
    pub async fn find(
        pool: &PgPool,
        user_id: Uuid,
        notification_type: &str,
    ) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r"
            SELECT user_id, notification_type, is_enabled, email_enabled
            FROM notification_preferences
            WHERE user_id = $1 AND notification_type = $2
            ",
        )
        .bind(user_id)
        .bind(notification_type)
        .fetch_optional(pool)
        .await
        .context("failed to fetch notification preference")?;

        Ok(row)
    }

    /// List every stored preference for a user.
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r"
            SELECT user_id, notification_type, is_enabled, email_enabled
            FROM notification_preferences
            WHERE user_id = $1
            ORDER BY notification_type
            ",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to list notification preferences")?;

        Ok(rows)
    }

    /// Insert or update a preference row.
    pub async fn upsert(
        pool: &PgPool,
        user_id: Uuid,
        notification_type: &str,
        is_enabled: bool,
        email_enabled: bool,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r"
            INSERT INTO notification_preferences (user_id, notification_type, is_enabled, email_enabled)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, notification_type)
            DO UPDATE SET is_enabled = $3, email_enabled = $4, updated_at = NOW()
            RETURNING user_id, notification_type, is_enabled, email_enabled
            ",
        )
        .bind(user_id)
        .bind(notification_type)
        .bind(is_enabled)
        .bind(email_enabled)
        .fetch_one(pool)
        .await
        .context("failed to upsert notification preference")?;

        Ok(row)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_preference_defaults_open() {
        let user_id = Uuid::now_v7();
        let pref = NotificationPreference::default_for(user_id, "comment.reply");
        assert!(pref.is_enabled);
        assert!(pref.email_enabled);
        assert_eq!(pref.notification_type, "comment.reply");
    }
}
