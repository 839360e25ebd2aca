//! Content type registry writes against a real database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use ossatura_kernel::cache::CacheLayer;
use ossatura_kernel::models::ContentTypeRecord;
use ossatura_kernel::registry::ContentTypeRegistry;

fn registry_for(pool: PgPool) -> ContentTypeRegistry {
    let cache = CacheLayer::new(redis::Client::open("redis://127.0.0.1:6379").unwrap());
    ContentTypeRegistry::new(pool, cache)
}

async fn insert_item(pool: &PgPool, content_type: &str, title: &str) {
    sqlx::query("INSERT INTO items (id, content_type, title) VALUES ($1, $2, $3)")
        .bind(Uuid::now_v7())
        .bind(content_type)
        .bind(title)
        .execute(pool)
        .await
        .unwrap();
}

async fn item_count(pool: &PgPool, content_type: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE content_type = $1")
        .bind(content_type)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_a_content_type_purges_its_items(pool: PgPool) {
    let registry = registry_for(pool.clone());
    registry.load().await.unwrap();

    registry
        .save("press_release", "Press release", None, &[], &json!({}))
        .await
        .unwrap();
    insert_item(&pool, "press_release", "Launch").await;
    insert_item(&pool, "press_release", "Follow-up").await;
    insert_item(&pool, "announcement", "Unrelated").await;

    assert!(registry.delete("press_release").await.unwrap());

    assert!(registry.get("press_release").is_none());
    assert_eq!(item_count(&pool, "press_release").await, 0);
    assert_eq!(item_count(&pool, "announcement").await, 1, "other types keep their items");

    // A second delete finds nothing left to remove.
    assert!(!registry.delete("press_release").await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_with_items_removes_row_and_items_together(pool: PgPool) {
    assert!(ContentTypeRecord::delete_with_items(&pool, "ghost")
        .await
        .unwrap()
        .is_none());

    ContentTypeRecord::upsert(&pool, "memo", "Memo", None, &json!([]), &json!({}))
        .await
        .unwrap();
    insert_item(&pool, "memo", "Q3 numbers").await;

    let purged = ContentTypeRecord::delete_with_items(&pool, "memo")
        .await
        .unwrap();
    assert_eq!(purged, Some(1));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_types WHERE handle = 'memo'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
    assert_eq!(item_count(&pool, "memo").await, 0);
}
