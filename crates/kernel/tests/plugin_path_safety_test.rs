//! Slug-to-path resolution must never escape the plugins root.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::sync::Arc;

use ossatura_kernel::cache::CacheLayer;
use ossatura_kernel::hook::HookBus;
use ossatura_kernel::plugin::{PluginError, PluginManager};
use sqlx::postgres::PgPoolOptions;

fn manager_for(dir: &std::path::Path) -> PluginManager {
    // Lazy pool and unconnected Redis client: path resolution never
    // touches either backend.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/ossatura_test")
        .unwrap();
    let cache = CacheLayer::new(redis::Client::open("redis://127.0.0.1:6379").unwrap());
    PluginManager::new(pool, cache, Arc::new(HookBus::new()), dir.to_path_buf())
}

#[test]
fn malicious_slugs_resolve_to_none() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_for(root.path());

    for slug in ["../../etc/passwd", "a/b", "a;b", "a|b", "a&b", "a\0b"] {
        assert!(
            manager.plugin_dir(slug).is_none(),
            "slug {slug:?} must not resolve"
        );
    }
}

#[test]
fn valid_slug_resolves_inside_root() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("blog")).unwrap();

    let manager = manager_for(root.path());
    let dir = manager.plugin_dir("blog").unwrap();

    assert!(dir.starts_with(root.path().canonicalize().unwrap()));
}

#[test]
fn unknown_slug_resolves_to_none() {
    let root = tempfile::tempdir().unwrap();
    let manager = manager_for(root.path());
    assert!(manager.plugin_dir("ghost").is_none());
}

#[tokio::test]
async fn install_rejects_manifest_whose_slug_differs_from_directory() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("blog");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("plugin.toml"),
        "slug = \"other\"\nname = \"Other\"\nversion = \"1.0.0\"\n",
    )
    .unwrap();

    // The lazy pool cannot serve queries; the mismatch must be caught
    // before any row is written.
    let manager = manager_for(root.path());
    let err = manager.install("blog").await.unwrap_err();

    assert!(
        matches!(err, PluginError::InvalidManifest { ref slug, .. } if slug == "blog"),
        "expected InvalidManifest, got {err:?}"
    );
}

#[cfg(unix)]
#[test]
fn symlink_escaping_root_resolves_to_none() {
    let root = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();

    std::os::unix::fs::symlink(outside.path(), root.path().join("sneaky")).unwrap();

    let manager = manager_for(root.path());
    assert!(manager.plugin_dir("sneaky").is_none());
}
