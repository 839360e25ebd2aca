//! Backup archives and update extraction.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::io::Write;

use ossatura_kernel::plugin::update::{replace_dir_contents, restore_backup, zip_directory};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[test]
fn backup_and_restore_round_trip() {
    let plugin = tempfile::tempdir().unwrap();
    fs::create_dir_all(plugin.path().join("migrations")).unwrap();
    fs::write(
        plugin.path().join("plugin.toml"),
        "slug = \"blog\"\nname = \"Blog\"\nversion = \"1.0\"\n",
    )
    .unwrap();
    fs::write(
        plugin.path().join("migrations/0001_posts.sql"),
        "CREATE TABLE posts (id UUID PRIMARY KEY);",
    )
    .unwrap();

    let backups = tempfile::tempdir().unwrap();
    let archive = backups.path().join("blog-1.0.zip");
    zip_directory(plugin.path(), &archive).unwrap();

    // Simulate a botched update wiping the directory.
    fs::remove_file(plugin.path().join("plugin.toml")).unwrap();
    fs::write(plugin.path().join("garbage.bin"), [0u8; 16]).unwrap();

    restore_backup(&archive, plugin.path()).unwrap();

    let manifest = fs::read_to_string(plugin.path().join("plugin.toml")).unwrap();
    assert!(manifest.contains("slug = \"blog\""));
    assert!(plugin.path().join("migrations/0001_posts.sql").exists());
    assert!(!plugin.path().join("garbage.bin").exists());
}

#[test]
fn extraction_skips_entries_that_traverse_upward() {
    let work = tempfile::tempdir().unwrap();
    let archive_path = work.path().join("evil.zip");

    let file = fs::File::create(&archive_path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    writer.start_file("../escape.txt", options).unwrap();
    writer.write_all(b"outside").unwrap();
    writer.start_file("safe.txt", options).unwrap();
    writer.write_all(b"inside").unwrap();
    writer.finish().unwrap();

    let dest = work.path().join("dest");
    fs::create_dir_all(&dest).unwrap();

    replace_dir_contents(&archive_path, &dest).unwrap();

    assert!(dest.join("safe.txt").exists());
    assert!(!work.path().join("escape.txt").exists());
    assert!(!dest.join("escape.txt").exists());
}

#[test]
fn extraction_replaces_directory_contents() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("plugin.toml"), "slug = \"v2\"").unwrap();

    let work = tempfile::tempdir().unwrap();
    let archive = work.path().join("update.zip");
    zip_directory(src.path(), &archive).unwrap();

    let dest = tempfile::tempdir().unwrap();
    fs::create_dir_all(dest.path().join("old-migrations")).unwrap();
    fs::write(dest.path().join("old-migrations/stale.sql"), "-- old").unwrap();

    replace_dir_contents(&archive, dest.path()).unwrap();

    assert_eq!(
        fs::read_to_string(dest.path().join("plugin.toml")).unwrap(),
        "slug = \"v2\""
    );
    assert!(!dest.path().join("old-migrations").exists());
}
