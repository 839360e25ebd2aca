//! Events carried by the hook bus.

use uuid::Uuid;

/// A domain event observable by subscribers.
#[derive(Debug, Clone)]
pub enum HookEvent {
    /// A notification was persisted for one or more recipients.
    NotificationSent {
        notification_id: Uuid,
        key: String,
        recipient_ids: Vec<Uuid>,
    },

    /// A recipient marked a notification as read.
    NotificationRead {
        notification_id: Uuid,
        user_id: Uuid,
    },

    /// A recipient dismissed a notification.
    NotificationDismissed {
        notification_id: Uuid,
        user_id: Uuid,
    },

    /// A plugin transitioned to active.
    PluginActivated { slug: String },

    /// A plugin transitioned to inactive.
    PluginDeactivated { slug: String },

    /// An update is about to begin. Observational only: subscribers
    /// cannot veto the update.
    PluginUpdating {
        slug: String,
        from_version: String,
        to_version: String,
    },

    /// A plugin registry row was removed.
    PluginDeleted { slug: String },
}

impl HookEvent {
    /// Stable event name for logging and audit entries.
    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::NotificationSent { .. } => "notification_sent",
            HookEvent::NotificationRead { .. } => "notification_read",
            HookEvent::NotificationDismissed { .. } => "notification_dismissed",
            HookEvent::PluginActivated { .. } => "plugin_activated",
            HookEvent::PluginDeactivated { .. } => "plugin_deactivated",
            HookEvent::PluginUpdating { .. } => "plugin_updating",
            HookEvent::PluginDeleted { .. } => "plugin_deleted",
        }
    }
}
