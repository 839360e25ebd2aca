//! Background jobs: the Redis-backed queue, the email delivery worker,
//! and the retention sweep.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Client as RedisClient;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{Notification, User};
use crate::state::AppState;

/// Queue name for notification email fanout.
pub const EMAIL_QUEUE: &str = "notify:email";

/// Blocking pop timeout for workers, in seconds.
const POP_TIMEOUT_SECS: f64 = 5.0;

/// How long notifications and audit entries are kept, in days.
const RETENTION_DAYS: i64 = 90;

/// Interval between retention sweeps.
const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);

/// FIFO job queue.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Append a payload to the named queue.
    async fn push(&self, queue: &str, payload: &str) -> Result<()>;

    /// Block up to `timeout_secs` waiting for the next payload.
    async fn pop(&self, queue: &str, timeout_secs: f64) -> Result<Option<String>>;

    /// Number of pending payloads.
    async fn len(&self, queue: &str) -> Result<u64>;
}

/// Redis list-backed queue. Producers RPUSH, workers BLPOP.
pub struct RedisQueue {
    client: RedisClient,
}

impl RedisQueue {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn queue_key(queue: &str) -> String {
        format!("queue:{queue}")
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection for queue push")?;

        conn.rpush::<_, _, ()>(Self::queue_key(queue), payload)
            .await
            .context("failed to push job")?;

        Ok(())
    }

    async fn pop(&self, queue: &str, timeout_secs: f64) -> Result<Option<String>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection for queue pop")?;

        // BLPOP returns (key, value) or nil on timeout.
        let result: Option<(String, String)> = conn
            .blpop(Self::queue_key(queue), timeout_secs)
            .await
            .context("failed to pop job")?;

        Ok(result.map(|(_, payload)| payload))
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection for queue len")?;

        let len: u64 = conn
            .llen(Self::queue_key(queue))
            .await
            .context("failed to read queue length")?;

        Ok(len)
    }
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue").finish()
    }
}

/// One queued notification email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailJob {
    pub user_id: Uuid,
    pub notification_id: Uuid,
    pub subject: String,
    pub body: String,
}

/// Spawn the email delivery worker.
///
/// Pops jobs from [`EMAIL_QUEUE`] forever. A failed delivery is logged
/// and dropped; the notification itself was already persisted.
pub fn spawn_email_worker(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("email worker started");
        loop {
            let payload = match state.queue().pop(EMAIL_QUEUE, POP_TIMEOUT_SECS).await {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "email queue pop failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            if let Err(e) = deliver_email(&state, &payload).await {
                error!(error = %e, "email delivery failed");
            }
        }
    })
}

async fn deliver_email(state: &AppState, payload: &str) -> Result<()> {
    let job: EmailJob = serde_json::from_str(payload).context("invalid email job payload")?;

    let Some(email) = state.email() else {
        debug!("email disabled, dropping job");
        return Ok(());
    };

    let Some(user) = User::find_by_id(state.pool(), job.user_id).await? else {
        warn!(user_id = %job.user_id, "email job for unknown user, dropping");
        return Ok(());
    };

    if !user.is_active() {
        debug!(user_id = %user.id, "skipping email for blocked user");
        return Ok(());
    }

    email
        .send_notification(&user.mail, &job.subject, &job.body)
        .await?;

    debug!(user_id = %user.id, notification_id = %job.notification_id, "notification email sent");
    Ok(())
}

/// Spawn the daily retention sweep for notifications and audit entries.
pub fn spawn_retention_worker(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
        loop {
            ticker.tick().await;

            match Notification::delete_older_than(state.pool(), RETENTION_DAYS).await {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted, "retention sweep removed old notifications");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "notification retention sweep failed"),
            }

            if let Err(e) = state.audit().cleanup(RETENTION_DAYS).await {
                warn!(error = %e, "audit retention sweep failed");
            }
        }
    })
}
