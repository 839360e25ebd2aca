//! Notification send and read-state operations.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hook::{HookBus, HookEvent};
use crate::jobs::{EmailJob, Queue, EMAIL_QUEUE};
use crate::models::notification::NewNotification;
use crate::models::{Notification, NotificationKind, User, UserNotification};
use crate::notify::{NotificationRegistry, PreferenceStore};

/// Per-send overrides applied on top of the registered definition.
#[derive(Debug, Clone, Default)]
pub struct SendOverrides {
    pub title: Option<String>,
    pub content: Option<String>,
    pub kind: Option<NotificationKind>,
    pub send_email: Option<bool>,
    /// Deep-merged over the definition's metadata.
    pub metadata: Option<Value>,
}

/// Orchestrates sends: resolves definitions, filters recipients by
/// preference, persists, emits hooks, and fans out email jobs.
pub struct NotificationService {
    pool: PgPool,
    registry: Arc<NotificationRegistry>,
    preferences: PreferenceStore,
    hooks: Arc<HookBus>,
    queue: Arc<dyn Queue>,
}

impl NotificationService {
    pub fn new(
        pool: PgPool,
        registry: Arc<NotificationRegistry>,
        preferences: PreferenceStore,
        hooks: Arc<HookBus>,
        queue: Arc<dyn Queue>,
    ) -> Self {
        Self {
            pool,
            registry,
            preferences,
            hooks,
            queue,
        }
    }

    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    /// Send a notification of a registered type to a set of users.
    ///
    /// Recipients are deduplicated, then filtered by preference. Returns
    /// `Ok(None)` when every recipient has opted out (or none were given);
    /// nothing is persisted in that case.
    pub async fn send(
        &self,
        key: &str,
        recipient_ids: &[Uuid],
        overrides: SendOverrides,
    ) -> Result<Option<Notification>> {
        let definition = self.registry.resolve(key);

        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        for id in recipient_ids {
            if seen.insert(*id) && self.preferences.should_receive(*id, key).await? {
                recipients.push(*id);
            }
        }

        if recipients.is_empty() {
            debug!(key = %key, "no eligible recipients, skipping send");
            return Ok(None);
        }

        let mut metadata = definition.metadata.clone();
        if let Some(overlay) = &overrides.metadata {
            deep_merge(&mut metadata, overlay);
        }

        let new = NewNotification {
            key: key.to_string(),
            kind: overrides.kind.unwrap_or(definition.kind),
            title: overrides.title.unwrap_or(definition.title),
            content: overrides.content.unwrap_or(definition.content),
            metadata,
            send_email: overrides.send_email.unwrap_or(definition.send_email),
        };
        let send_email = new.send_email;

        let notification =
            Notification::create_with_recipients(&self.pool, new, &recipients).await?;

        self.hooks.emit(&HookEvent::NotificationSent {
            notification_id: notification.id,
            key: key.to_string(),
            recipient_ids: recipients.clone(),
        });

        if send_email {
            self.enqueue_emails(&notification, &recipients).await;
        }

        Ok(Some(notification))
    }

    /// Send to every active user holding a role.
    pub async fn send_to_role(
        &self,
        key: &str,
        role: &str,
        overrides: SendOverrides,
    ) -> Result<Option<Notification>> {
        let ids = User::ids_with_role(&self.pool, role).await?;
        self.send(key, &ids, overrides).await
    }

    /// Send to the authenticated user, if any. `None` (anonymous caller)
    /// is a quiet no-op.
    pub async fn send_to_current_user(
        &self,
        key: &str,
        current_user: Option<Uuid>,
        overrides: SendOverrides,
    ) -> Result<Option<Notification>> {
        match current_user {
            Some(id) => self.send(key, &[id], overrides).await,
            None => Ok(None),
        }
    }

    /// Queue one email job per recipient who still wants email for this
    /// type. Enqueue failures are logged, never propagated: a Redis
    /// outage must not fail the send.
    async fn enqueue_emails(&self, notification: &Notification, recipients: &[Uuid]) {
        for user_id in recipients {
            let wants_email = match self.preferences.should_email(*user_id, &notification.key).await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "preference lookup failed, skipping email");
                    continue;
                }
            };
            if !wants_email {
                continue;
            }

            let job = EmailJob {
                user_id: *user_id,
                notification_id: notification.id,
                subject: notification.title.clone(),
                body: notification.content.clone(),
            };

            let payload = match serde_json::to_string(&job) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "failed to serialize email job");
                    continue;
                }
            };

            if let Err(e) = self.queue.push(EMAIL_QUEUE, &payload).await {
                warn!(
                    user_id = %user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "failed to enqueue email job"
                );
            }
        }
    }

    /// One notification as seen by a recipient, or None when it does not
    /// exist or was not addressed to them.
    pub async fn find_for_user(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserNotification>> {
        Notification::find_for_user(&self.pool, id, user_id).await
    }

    /// A recipient's feed, newest first, excluding dismissed rows.
    pub async fn feed(
        &self,
        user_id: Uuid,
        limit: i64,
        unread_only: bool,
    ) -> Result<Vec<UserNotification>> {
        Notification::feed_for_user(&self.pool, user_id, limit, unread_only).await
    }

    /// Mark one notification read. Emits a hook only on rows that exist.
    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let marked = Notification::mark_read(&self.pool, id, user_id).await?;
        if marked {
            self.hooks.emit(&HookEvent::NotificationRead {
                notification_id: id,
                user_id,
            });
        }
        Ok(marked)
    }

    /// Dismiss one notification.
    pub async fn dismiss(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let dismissed = Notification::dismiss(&self.pool, id, user_id).await?;
        if dismissed {
            self.hooks.emit(&HookEvent::NotificationDismissed {
                notification_id: id,
                user_id,
            });
        }
        Ok(dismissed)
    }

    /// Mark all unread notifications read; the count covers only rows
    /// that actually changed.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        Notification::mark_all_read(&self.pool, user_id).await
    }

    /// Dismiss all notifications; the count covers only rows that
    /// actually changed.
    pub async fn dismiss_all(&self, user_id: Uuid) -> Result<u64> {
        Notification::dismiss_all(&self.pool, user_id).await
    }

    /// Unread, non-dismissed count for the badge.
    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        Notification::unread_count(&self.pool, user_id).await
    }
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService").finish()
    }
}

/// Merge `overlay` into `base`. Nested objects merge recursively; any
/// other value in the overlay replaces the base value wholesale.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deep_merge_merges_nested_objects() {
        let mut base = json!({
            "icon": "bell",
            "link": {"path": "/comments", "label": "View"}
        });
        deep_merge(&mut base, &json!({"link": {"path": "/comments/42"}}));

        assert_eq!(base["icon"], "bell");
        assert_eq!(base["link"]["path"], "/comments/42");
        assert_eq!(base["link"]["label"], "View");
    }

    #[test]
    fn deep_merge_replaces_scalars_and_arrays() {
        let mut base = json!({"tags": ["a", "b"], "count": 1});
        deep_merge(&mut base, &json!({"tags": ["c"], "count": 2}));

        assert_eq!(base["tags"], json!(["c"]));
        assert_eq!(base["count"], 2);
    }

    #[test]
    fn deep_merge_adds_new_keys() {
        let mut base = json!({});
        deep_merge(&mut base, &json!({"extra": {"a": 1}}));
        assert_eq!(base["extra"]["a"], 1);
    }

    #[test]
    fn deep_merge_overlay_object_replaces_scalar() {
        let mut base = json!({"link": "/old"});
        deep_merge(&mut base, &json!({"link": {"path": "/new"}}));
        assert_eq!(base["link"]["path"], "/new");
    }
}
