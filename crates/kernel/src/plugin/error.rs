//! Plugin subsystem errors.

use thiserror::Error;

use crate::error::AppError;

/// Errors from plugin lifecycle and update operations.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{0}' is not installed")]
    NotInstalled(String),

    #[error("invalid plugin slug '{0}'")]
    InvalidSlug(String),

    #[error("plugin '{0}' not found on disk")]
    NotFoundOnDisk(String),

    #[error("plugin '{slug}' has an invalid manifest: {details}")]
    InvalidManifest { slug: String, details: String },

    #[error("plugin '{plugin}' migration file not found: {path}")]
    MigrationFileNotFound { plugin: String, path: String },

    #[error("plugin '{plugin}' migration '{migration}' failed: {details}")]
    MigrationFailed {
        plugin: String,
        migration: String,
        details: String,
    },

    #[error("plugin '{0}' declares no update URL")]
    NoUpdateUrl(String),

    #[error("update check for plugin '{slug}' failed: {details}")]
    UpdateCheckFailed { slug: String, details: String },

    #[error("download for plugin '{slug}' failed: {details}")]
    DownloadFailed { slug: String, details: String },

    #[error("backup for plugin '{slug}' failed: {details}")]
    BackupFailed { slug: String, details: String },

    #[error("extracting update for plugin '{slug}' failed: {details}")]
    ExtractFailed { slug: String, details: String },

    #[error("restoring backup for plugin '{slug}' failed: {details}")]
    RestoreFailed { slug: String, details: String },

    #[error("removing files for plugin '{slug}' failed: {details}")]
    RemoveFailed { slug: String, details: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Database(e) => AppError::Database(e),
            PluginError::Other(e) => AppError::Internal(e),
            // Domain-level failures surface to API callers with their
            // message intact.
            other => AppError::Unprocessable(other.to_string()),
        }
    }
}
