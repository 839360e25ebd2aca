//! Plugin registry rows against a real database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use sqlx::PgPool;

use ossatura_kernel::models::PluginRecord;

#[sqlx::test(migrations = "../../migrations")]
async fn install_is_idempotent(pool: PgPool) {
    let meta = json!({"description": "A blog", "update_url": null});

    let first = PluginRecord::install(&pool, "blog", "Blog", "1.0.0", &meta)
        .await
        .unwrap();
    let second = PluginRecord::install(&pool, "blog", "Blog renamed", "9.9.9", &meta)
        .await
        .unwrap();

    assert_eq!(second.name, first.name, "existing rows are returned unchanged");
    assert_eq!(second.version, "1.0.0");
}

#[sqlx::test(migrations = "../../migrations")]
async fn refresh_from_manifest_tracks_the_files_on_disk(pool: PgPool) {
    let meta = json!({"description": "A blog", "update_url": "https://example.com/blog.json"});
    PluginRecord::install(&pool, "blog", "Blog", "1.0.0", &meta)
        .await
        .unwrap();

    let new_meta = json!({
        "description": "A better blog",
        "update_url": "https://example.com/v2/blog.json",
    });
    let refreshed = PluginRecord::refresh_from_manifest(&pool, "blog", "Blog 2", "2.0.0", &new_meta)
        .await
        .unwrap();
    assert!(refreshed);

    let record = PluginRecord::find_by_slug(&pool, "blog")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "Blog 2");
    assert_eq!(record.version, "2.0.0");
    assert_eq!(record.meta, new_meta);

    // Unknown slugs refresh nothing.
    assert!(
        !PluginRecord::refresh_from_manifest(&pool, "ghost", "Ghost", "1.0.0", &new_meta)
            .await
            .unwrap()
    );
}
