//! Plugin lifecycle: discovery, installation, activation, migrations,
//! and updates.
//!
//! A plugin is a directory under the plugins root containing a
//! `plugin.toml` manifest, SQL migrations, and any assets it ships.
//! Installed/active state lives in the `plugins` table; the filesystem
//! is the source of truth for what is available.

pub mod error;
pub mod manager;
pub mod manifest;
pub mod migration;
pub mod update;

pub use error::PluginError;
pub use manager::{DeactivationReport, PluginManager};
pub use manifest::{PluginManifest, MANIFEST_FILE};
pub use update::{UpdateInfo, UpdateManager};
