//! Delivery preference checks.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::NotificationPreference;

/// Answers "should this user receive this type?" questions.
#[derive(Clone)]
pub struct PreferenceStore {
    pool: PgPool,
}

impl PreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a user's preference for a type, defaulting open when no row
    /// has been stored.
    pub async fn get(&self, user_id: Uuid, notification_type: &str) -> Result<NotificationPreference> {
        let pref = NotificationPreference::find(&self.pool, user_id, notification_type)
            .await?
            .unwrap_or_else(|| NotificationPreference::default_for(user_id, notification_type));

        Ok(pref)
    }

    /// Whether in-app delivery is enabled for this user and type.
    pub async fn should_receive(&self, user_id: Uuid, notification_type: &str) -> Result<bool> {
        Ok(self.get(user_id, notification_type).await?.is_enabled)
    }

    /// Whether email delivery is enabled for this user and type.
    ///
    /// Email is gated on in-app delivery: a type disabled entirely never
    /// emails, whatever the email flag says.
    pub async fn should_email(&self, user_id: Uuid, notification_type: &str) -> Result<bool> {
        let pref = self.get(user_id, notification_type).await?;
        Ok(pref.is_enabled && pref.email_enabled)
    }

    /// Store a preference.
    pub async fn set(
        &self,
        user_id: Uuid,
        notification_type: &str,
        is_enabled: bool,
        email_enabled: bool,
    ) -> Result<NotificationPreference> {
        NotificationPreference::upsert(
            &self.pool,
            user_id,
            notification_type,
            is_enabled,
            email_enabled,
        )
        .await
    }

    /// All stored preferences for a user. Types without rows are absent;
    /// callers treat absence as enabled.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<NotificationPreference>> {
        NotificationPreference::list_for_user(&self.pool, user_id).await
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore").finish()
    }
}
