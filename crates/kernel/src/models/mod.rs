//! Database models with hand-written SQL.

pub mod content_type;
pub mod notification;
pub mod plugin;
pub mod preference;
pub mod taxonomy;
pub mod user;

pub use content_type::ContentTypeRecord;
pub use notification::{Notification, NotificationKind, UserNotification};
pub use plugin::PluginRecord;
pub use preference::NotificationPreference;
pub use taxonomy::TaxonomyRecord;
pub use user::User;
