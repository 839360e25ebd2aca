//! Plugin updates: remote version checks, zip backups, and in-place
//! replacement with restore on failure.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::hook::{HookBus, HookEvent};
use crate::models::PluginRecord;

use super::error::PluginError;
use super::manager::PluginManager;
use super::manifest::{PluginManifest, MANIFEST_FILE};

/// HTTP timeout for update checks and downloads.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on entries in a downloaded archive.
const MAX_ZIP_ENTRIES: usize = 10_000;

/// A plugin's remote update descriptor, fetched from its `update_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteManifest {
    pub version: String,
    pub download_url: String,
}

/// Result of a positive update check.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateInfo {
    pub installed: String,
    pub available: String,
    #[serde(skip)]
    pub download_url: String,
}

/// Downloads and applies plugin updates, with a zip backup taken first
/// and restored if extraction fails.
pub struct UpdateManager {
    pool: PgPool,
    http: reqwest::Client,
    hooks: Arc<HookBus>,
    manager: Arc<PluginManager>,
    backups_dir: PathBuf,
}

impl UpdateManager {
    pub fn new(
        pool: PgPool,
        hooks: Arc<HookBus>,
        manager: Arc<PluginManager>,
        backups_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            pool,
            http,
            hooks,
            manager,
            backups_dir,
        })
    }

    /// Check whether a newer version is available.
    ///
    /// Returns `Ok(None)` when the plugin is already current (or the
    /// remote offers something older).
    pub async fn check(&self, slug: &str) -> Result<Option<UpdateInfo>, PluginError> {
        let record = PluginRecord::find_by_slug(&self.pool, slug)
            .await
            .context("failed to look up plugin")?
            .ok_or_else(|| PluginError::NotInstalled(slug.to_string()))?;

        let manifest = self
            .manager
            .get_plugin(slug)
            .ok_or_else(|| PluginError::NotFoundOnDisk(slug.to_string()))?;

        let update_url = manifest
            .update_url
            .ok_or_else(|| PluginError::NoUpdateUrl(slug.to_string()))?;

        let response = self.http.get(&update_url).send().await.map_err(|e| {
            PluginError::UpdateCheckFailed {
                slug: slug.to_string(),
                details: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            return Err(PluginError::UpdateCheckFailed {
                slug: slug.to_string(),
                details: format!("remote returned {}", response.status()),
            });
        }

        let remote: RemoteManifest =
            response
                .json()
                .await
                .map_err(|e| PluginError::UpdateCheckFailed {
                    slug: slug.to_string(),
                    details: format!("invalid remote manifest: {e}"),
                })?;

        let installed = Version::parse(&record.version);
        let available = Version::parse(&remote.version);

        if available > installed {
            Ok(Some(UpdateInfo {
                installed: record.version,
                available: remote.version,
                download_url: remote.download_url,
            }))
        } else {
            Ok(None)
        }
    }

    /// Apply an available update. Returns false when already current.
    ///
    /// Order of operations: check, emit the updating hook, back up the
    /// current files, deactivate if active, download, extract over the
    /// plugin directory. Extraction failure restores the backup.
    pub async fn update(&self, slug: &str) -> Result<bool, PluginError> {
        let Some(update) = self.check(slug).await? else {
            info!(slug = %slug, "plugin already up to date");
            return Ok(false);
        };

        let dir = self
            .manager
            .plugin_dir(slug)
            .ok_or_else(|| PluginError::NotFoundOnDisk(slug.to_string()))?;

        self.hooks.emit(&HookEvent::PluginUpdating {
            slug: slug.to_string(),
            from_version: update.installed.clone(),
            to_version: update.available.clone(),
        });

        let backup_path = self.backup(slug, &update.installed, &dir)?;
        info!(slug = %slug, backup = %backup_path.display(), "plugin backed up");

        if self.manager.is_active(slug) {
            let report = self.manager.deactivate(slug).await?;
            for err in &report.rollback_errors {
                warn!(slug = %slug, error = %err, "rollback error during update");
            }
        }

        let archive = self.download(slug, &update.download_url).await?;

        if let Err(e) = replace_dir_contents(&archive, &dir) {
            warn!(slug = %slug, error = %e, "extraction failed, restoring backup");
            restore_backup(&backup_path, &dir).map_err(|restore_err| {
                PluginError::RestoreFailed {
                    slug: slug.to_string(),
                    details: format!("after extract failure ({e}): {restore_err}"),
                }
            })?;
            let _ = std::fs::remove_file(&archive);
            return Err(PluginError::ExtractFailed {
                slug: slug.to_string(),
                details: e.to_string(),
            });
        }

        let _ = std::fs::remove_file(&archive);

        // The extracted files are authoritative now; re-read their
        // manifest so name and metadata track what actually landed.
        match PluginManifest::parse(&dir.join(MANIFEST_FILE)) {
            Ok(manifest) => {
                let meta = json!({
                    "description": manifest.description,
                    "update_url": manifest.update_url,
                });
                PluginRecord::refresh_from_manifest(
                    &self.pool,
                    slug,
                    &manifest.name,
                    &manifest.version,
                    &meta,
                )
                .await
                .context("failed to record updated plugin")?;
            }
            Err(e) => {
                warn!(slug = %slug, error = %e, "updated files have no readable manifest");
                PluginRecord::set_version(&self.pool, slug, &update.available)
                    .await
                    .context("failed to record updated version")?;
            }
        }

        self.manager.invalidate_discovery().await;

        info!(
            slug = %slug,
            from = %update.installed,
            to = %update.available,
            "plugin updated"
        );
        Ok(true)
    }

    /// Zip the plugin directory into the backups directory, returning
    /// the archive path.
    fn backup(&self, slug: &str, version: &str, dir: &Path) -> Result<PathBuf, PluginError> {
        std::fs::create_dir_all(&self.backups_dir).map_err(|e| PluginError::BackupFailed {
            slug: slug.to_string(),
            details: format!("cannot create backups directory: {e}"),
        })?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S");
        let path = self.backups_dir.join(format!("{slug}-{version}-{timestamp}.zip"));

        zip_directory(dir, &path).map_err(|e| PluginError::BackupFailed {
            slug: slug.to_string(),
            details: e.to_string(),
        })?;

        Ok(path)
    }

    /// Download the update archive next to the backups.
    async fn download(&self, slug: &str, url: &str) -> Result<PathBuf, PluginError> {
        let response =
            self.http
                .get(url)
                .send()
                .await
                .map_err(|e| PluginError::DownloadFailed {
                    slug: slug.to_string(),
                    details: e.to_string(),
                })?;

        if !response.status().is_success() {
            return Err(PluginError::DownloadFailed {
                slug: slug.to_string(),
                details: format!("remote returned {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PluginError::DownloadFailed {
                slug: slug.to_string(),
                details: e.to_string(),
            })?;

        let path = self.backups_dir.join(format!("{slug}-download.zip"));
        std::fs::write(&path, &bytes).map_err(|e| PluginError::DownloadFailed {
            slug: slug.to_string(),
            details: format!("cannot write archive: {e}"),
        })?;

        Ok(path)
    }
}

impl std::fmt::Debug for UpdateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateManager")
            .field("backups_dir", &self.backups_dir)
            .finish()
    }
}

/// Zip a directory's contents, paths stored relative to `dir`.
pub fn zip_directory(dir: &Path, archive_path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(archive_path)
        .with_context(|| format!("cannot create {}", archive_path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    zip_dir_recursive(&mut writer, dir, dir, options)?;

    writer.finish().context("failed to finalize archive")?;
    Ok(())
}

fn zip_dir_recursive(
    writer: &mut ZipWriter<std::fs::File>,
    root: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .context("entry outside archive root")?
            .to_string_lossy()
            .replace('\\', "/");

        if path.is_dir() {
            writer.add_directory(relative, options)?;
            zip_dir_recursive(writer, root, &path, options)?;
        } else {
            writer.start_file(relative, options)?;
            let mut file = std::fs::File::open(&path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            writer.write_all(&buf)?;
        }
    }
    Ok(())
}

/// Extract an archive into a directory, clearing existing contents first.
///
/// Entries with unsafe paths (absolute, or traversing outside the
/// destination) are skipped.
pub fn replace_dir_contents(archive_path: &Path, dest: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(archive_path)
        .with_context(|| format!("cannot open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;

    if archive.len() > MAX_ZIP_ENTRIES {
        anyhow::bail!("archive has too many entries: {}", archive.len());
    }

    clear_dir(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        // enclosed_name rejects absolute paths and `..` components.
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out_file = std::fs::File::create(&out_path)
            .with_context(|| format!("cannot create {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out_file)?;
    }

    Ok(())
}

/// Restore a backup archive over a plugin directory.
pub fn restore_backup(backup_path: &Path, dest: &Path) -> anyhow::Result<()> {
    replace_dir_contents(backup_path, dest)
}

fn clear_dir(dir: &Path) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Dotted numeric version with an optional pre-release suffix, e.g.
/// `1.2.0` or `1.2.0-rc1`.
///
/// Segments compare numerically; missing segments count as zero, so
/// `1.2` equals `1.2.0`, and non-numeric segments compare as zero. On
/// equal segments a pre-release sorts before the full release, and two
/// pre-release labels compare lexicographically.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    segments: Vec<u64>,
    pre_release: Option<String>,
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Version {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let (base, pre_release) = match s.split_once('-') {
            Some((base, pre)) => (base, Some(pre.to_string())),
            None => (s, None),
        };

        Self {
            segments: base.split('.').map(|seg| seg.parse().unwrap_or(0)).collect(),
            pre_release,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                std::cmp::Ordering::Equal => {}
                other => return other,
            }
        }

        match (&self.pre_release, &other.pre_release) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some(_), None) => std::cmp::Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version::parse("1.2.0") > Version::parse("1.1.9"));
        assert!(Version::parse("2.0") > Version::parse("1.9.9"));
        assert!(Version::parse("1.10") > Version::parse("1.9"));
        assert!(Version::parse("0.1") < Version::parse("0.1.1"));
    }

    #[test]
    fn version_missing_segments_are_zero() {
        assert_eq!(Version::parse("1.2"), Version::parse("1.2.0"));
        assert_eq!(Version::parse("1"), Version::parse("1.0.0"));
    }

    #[test]
    fn version_non_numeric_segments_compare_as_zero() {
        assert_eq!(Version::parse("1.x"), Version::parse("1.0"));
    }

    #[test]
    fn version_pre_release_of_a_newer_base_is_newer() {
        assert!(Version::parse("1.0.1-rc1") > Version::parse("1.0.0"));
        assert!(Version::parse("2.0.0-beta") > Version::parse("1.9.9"));
    }

    #[test]
    fn version_pre_release_sorts_before_its_release() {
        assert!(Version::parse("1.0.1-rc1") < Version::parse("1.0.1"));
        assert!(Version::parse("1.0.1-rc1") < Version::parse("1.0.1-rc2"));
    }

    #[test]
    fn zip_round_trip_preserves_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("migrations")).unwrap();
        std::fs::write(src.path().join("plugin.toml"), "slug = \"demo\"").unwrap();
        std::fs::write(
            src.path().join("migrations/0001_init.sql"),
            "CREATE TABLE demo ();",
        )
        .unwrap();

        let archive_dir = tempfile::tempdir().unwrap();
        let archive = archive_dir.path().join("demo.zip");
        zip_directory(src.path(), &archive).unwrap();

        let dest = tempfile::tempdir().unwrap();
        replace_dir_contents(&archive, dest.path()).unwrap();

        let manifest = std::fs::read_to_string(dest.path().join("plugin.toml")).unwrap();
        assert_eq!(manifest, "slug = \"demo\"");
        let sql = std::fs::read_to_string(dest.path().join("migrations/0001_init.sql")).unwrap();
        assert_eq!(sql, "CREATE TABLE demo ();");
    }

    #[test]
    fn extraction_clears_stale_files() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("keep.txt"), "new").unwrap();

        let archive_dir = tempfile::tempdir().unwrap();
        let archive = archive_dir.path().join("update.zip");
        zip_directory(src.path(), &archive).unwrap();

        let dest = tempfile::tempdir().unwrap();
        std::fs::write(dest.path().join("stale.txt"), "old").unwrap();

        replace_dir_contents(&archive, dest.path()).unwrap();

        assert!(dest.path().join("keep.txt").exists());
        assert!(!dest.path().join("stale.txt").exists());
    }
}
