//! Notification subsystem.
//!
//! The registry holds notification type definitions (seeded from the
//! boot definitions file, extended by plugins through hook filters), the
//! preference store answers delivery questions per user, and the service
//! ties them together with persistence, hook emission, and email fanout.

mod preferences;
mod registry;
mod service;

pub use preferences::PreferenceStore;
pub use registry::{NotificationDefinition, NotificationRegistry};
pub use service::{NotificationService, SendOverrides};
