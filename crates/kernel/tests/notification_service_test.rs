//! Send and read-state behavior of the notification service against a
//! real database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use common::{insert_user, notification_service, MemoryQueue};
use ossatura_kernel::jobs::{EmailJob, Queue, EMAIL_QUEUE};
use ossatura_kernel::notify::SendOverrides;

async fn recipient_ids(pool: &PgPool, notification_id: Uuid) -> Vec<Uuid> {
    sqlx::query_scalar("SELECT user_id FROM notification_user WHERE notification_id = $1")
        .bind(notification_id)
        .fetch_all(pool)
        .await
        .unwrap()
}

async fn notification_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn send_persists_one_row_and_only_eligible_recipients(pool: PgPool) {
    let queue = Arc::new(MemoryQueue::default());
    let service = notification_service(pool.clone(), queue);

    let alice = insert_user(&pool, "alice").await;
    let bob = insert_user(&pool, "bob").await;
    let carol = insert_user(&pool, "carol").await;

    // Carol opted out of the type entirely; Alice and Bob have no
    // stored preference and default open.
    service
        .preferences()
        .set(carol, "welcome", false, false)
        .await
        .unwrap();

    let notification = service
        .send(
            "welcome",
            &[alice, bob, carol, alice],
            SendOverrides::default(),
        )
        .await
        .unwrap()
        .expect("two recipients remain eligible");

    assert_eq!(notification_count(&pool).await, 1);

    let recipients = recipient_ids(&pool, notification.id).await;
    assert_eq!(recipients.len(), 2, "duplicate and opted-out recipients must not get rows");
    assert!(recipients.contains(&alice));
    assert!(recipients.contains(&bob));
    assert!(!recipients.contains(&carol));
}

#[sqlx::test(migrations = "../../migrations")]
async fn send_returns_none_when_every_recipient_opted_out(pool: PgPool) {
    let queue = Arc::new(MemoryQueue::default());
    let service = notification_service(pool.clone(), queue.clone());

    let alice = insert_user(&pool, "alice").await;
    service
        .preferences()
        .set(alice, "welcome", false, true)
        .await
        .unwrap();

    let sent = service
        .send("welcome", &[alice], SendOverrides::default())
        .await
        .unwrap();

    assert!(sent.is_none());
    assert_eq!(notification_count(&pool).await, 0, "nothing may be persisted");
    assert_eq!(queue.len(EMAIL_QUEUE).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_read_is_idempotent_and_keeps_the_first_timestamp(pool: PgPool) {
    let queue = Arc::new(MemoryQueue::default());
    let service = notification_service(pool.clone(), queue);

    let alice = insert_user(&pool, "alice").await;
    let notification = service
        .send("welcome", &[alice], SendOverrides::default())
        .await
        .unwrap()
        .unwrap();

    assert!(service.mark_read(notification.id, alice).await.unwrap());
    let first = service
        .find_for_user(notification.id, alice)
        .await
        .unwrap()
        .unwrap();
    assert!(first.is_read);
    let first_read_at = first.read_at.expect("read_at set on first mark");

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(service.mark_read(notification.id, alice).await.unwrap());
    let second = service
        .find_for_user(notification.id, alice)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second.read_at, Some(first_read_at));
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_all_read_counts_only_rows_that_changed(pool: PgPool) {
    let queue = Arc::new(MemoryQueue::default());
    let service = notification_service(pool.clone(), queue);

    let alice = insert_user(&pool, "alice").await;
    let first = service
        .send("welcome", &[alice], SendOverrides::default())
        .await
        .unwrap()
        .unwrap();
    service
        .send("welcome", &[alice], SendOverrides::default())
        .await
        .unwrap()
        .unwrap();

    assert!(service.mark_read(first.id, alice).await.unwrap());

    assert_eq!(service.mark_all_read(alice).await.unwrap(), 1);
    assert_eq!(service.mark_all_read(alice).await.unwrap(), 0);
    assert_eq!(service.unread_count(alice).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn emailing_types_enqueue_jobs_only_for_email_opt_ins(pool: PgPool) {
    let queue = Arc::new(MemoryQueue::default());
    let service = notification_service(pool.clone(), queue.clone());

    let alice = insert_user(&pool, "alice").await;
    let bob = insert_user(&pool, "bob").await;
    let carol = insert_user(&pool, "carol").await;

    // Carol still gets the in-app notification but no email.
    service
        .preferences()
        .set(carol, "welcome", true, false)
        .await
        .unwrap();

    let notification = service
        .send("welcome", &[alice, bob, carol], SendOverrides::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(recipient_ids(&pool, notification.id).await.len(), 3);

    let payloads = queue.payloads(EMAIL_QUEUE);
    assert_eq!(payloads.len(), 2);

    let jobs: Vec<EmailJob> = payloads
        .iter()
        .map(|p| serde_json::from_str(p).unwrap())
        .collect();
    for job in &jobs {
        assert_eq!(job.notification_id, notification.id);
        assert_eq!(job.subject, "Welcome aboard");
        assert!(job.user_id == alice || job.user_id == bob);
    }
}
