//! Shared fixtures for database-backed tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use uuid::Uuid;

use ossatura_kernel::hook::HookBus;
use ossatura_kernel::jobs::Queue;
use ossatura_kernel::notify::{
    NotificationDefinition, NotificationRegistry, NotificationService, PreferenceStore,
};

/// In-memory queue standing in for Redis, so tests can count enqueued
/// jobs without a broker.
#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryQueue {
    /// Snapshot of pending payloads on a queue, oldest first.
    pub fn payloads(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<()> {
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        Ok(())
    }

    async fn pop(&self, queue: &str, _timeout_secs: f64) -> Result<Option<String>> {
        Ok(self
            .queues
            .lock()
            .get_mut(queue)
            .and_then(VecDeque::pop_front))
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        Ok(self
            .queues
            .lock()
            .get(queue)
            .map_or(0, |q| q.len() as u64))
    }
}

/// Insert a minimal active user and return its id.
pub async fn insert_user(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id, name, mail) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(format!("{name}@example.com"))
        .execute(pool)
        .await
        .unwrap();
    id
}

/// Build a notification service over the given pool and queue, with a
/// `welcome` definition that emails by default.
pub fn notification_service(pool: PgPool, queue: Arc<MemoryQueue>) -> NotificationService {
    let registry = Arc::new(NotificationRegistry::new());

    let mut welcome = NotificationDefinition::new("welcome", "Welcome aboard");
    welcome.content = "Thanks for signing up.".to_string();
    welcome.send_email = true;
    registry.register(welcome);

    NotificationService::new(
        pool.clone(),
        registry,
        PreferenceStore::new(pool),
        Arc::new(HookBus::new()),
        queue,
    )
}
