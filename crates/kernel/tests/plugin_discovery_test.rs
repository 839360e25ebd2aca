//! Filesystem discovery of plugin manifests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use ossatura_kernel::plugin::manager::scan_plugins_dir;

fn write_manifest(dir: &Path, slug: &str, content: &str) {
    let plugin_dir = dir.join(slug);
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::write(plugin_dir.join("plugin.toml"), content).unwrap();
}

#[test]
fn discovers_only_valid_plugins() {
    let root = tempfile::tempdir().unwrap();

    write_manifest(
        root.path(),
        "blog",
        "slug = \"blog\"\nname = \"Blog\"\nversion = \"1.0.0\"\n",
    );

    // Invalid TOML is skipped.
    write_manifest(root.path(), "broken", "slug = \"broken\"\nname = ");

    // Slug/directory mismatch is skipped.
    write_manifest(
        root.path(),
        "renamed",
        "slug = \"other\"\nname = \"Other\"\nversion = \"1.0\"\n",
    );

    // Directory without a manifest is skipped.
    fs::create_dir_all(root.path().join("empty")).unwrap();

    // Stray files at the root are ignored.
    fs::write(root.path().join("README.md"), "notes").unwrap();

    let found = scan_plugins_dir(root.path());

    assert_eq!(found.len(), 1);
    let blog = found.get("blog").unwrap();
    assert_eq!(blog.name, "Blog");
    assert_eq!(blog.version, "1.0.0");
}

#[test]
fn missing_plugins_directory_yields_empty_map() {
    let root = tempfile::tempdir().unwrap();
    let found = scan_plugins_dir(&root.path().join("does-not-exist"));
    assert!(found.is_empty());
}

#[test]
fn discovery_reads_migrations_and_hooks() {
    let root = tempfile::tempdir().unwrap();

    write_manifest(
        root.path(),
        "forum",
        r#"
slug = "forum"
name = "Forum"
version = "2.1.0"
update_url = "https://plugins.example.com/forum.json"

[migrations]
files = ["migrations/0001_topics.sql"]
rollbacks = ["migrations/0001_topics.down.sql"]

[hooks]
subscribes = ["notification_sent"]
weight = -5
"#,
    );

    let found = scan_plugins_dir(root.path());
    let forum = found.get("forum").unwrap();

    assert_eq!(forum.migrations.files, vec!["migrations/0001_topics.sql"]);
    assert_eq!(forum.hooks.subscribes, vec!["notification_sent"]);
    assert_eq!(forum.hooks.weight, -5);
    assert!(forum.update_url.is_some());
}
