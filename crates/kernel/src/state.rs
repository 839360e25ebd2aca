//! Shared application state.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::cache::CacheLayer;
use crate::config::Config;
use crate::db;
use crate::definitions;
use crate::hook::{HookBus, HookEvent};
use crate::jobs::{Queue, RedisQueue};
use crate::notify::{NotificationRegistry, NotificationService, PreferenceStore};
use crate::plugin::{PluginManager, UpdateManager};
use crate::registry::{ContentTypeRegistry, TaxonomyRegistry};
use crate::services::{ApmService, AuditService, EmailService};

/// Shared application state, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    pool: PgPool,
    redis: RedisClient,
    cache: CacheLayer,
    hooks: Arc<HookBus>,
    queue: Arc<dyn Queue>,
    notifications: NotificationService,
    plugins: Arc<PluginManager>,
    updates: UpdateManager,
    content_types: ContentTypeRegistry,
    taxonomies: TaxonomyRegistry,
    audit: AuditService,
    email: Option<EmailService>,
    apm: Option<ApmService>,
}

impl AppState {
    /// Build the full application state: connect to Postgres and Redis,
    /// run core migrations, load boot definitions, and wire the
    /// subsystems together.
    pub async fn new(config: Config) -> Result<Self> {
        let pool = db::create_pool(&config).await?;
        db::run_migrations(&pool).await?;

        let redis = RedisClient::open(config.redis_url.as_str())
            .context("failed to create Redis client")?;
        let cache = CacheLayer::new(redis.clone());

        let hooks = Arc::new(HookBus::new());
        let audit = AuditService::new(pool.clone());
        register_audit_subscriber(&hooks, audit.clone());

        let defs = definitions::load(&config.definitions_file)?;

        let registry = Arc::new(NotificationRegistry::from_seeds(&defs.notifications, &hooks));
        let preferences = PreferenceStore::new(pool.clone());
        let queue: Arc<dyn Queue> = Arc::new(RedisQueue::new(redis.clone()));

        let notifications = NotificationService::new(
            pool.clone(),
            Arc::clone(&registry),
            preferences,
            Arc::clone(&hooks),
            Arc::clone(&queue),
        );

        let plugins = Arc::new(PluginManager::new(
            pool.clone(),
            cache.clone(),
            Arc::clone(&hooks),
            config.plugins_dir.clone(),
        ));
        plugins.load_active().await?;

        let updates = UpdateManager::new(
            pool.clone(),
            Arc::clone(&hooks),
            Arc::clone(&plugins),
            config.backups_dir.clone(),
        )?;

        let content_types = ContentTypeRegistry::new(pool.clone(), cache.clone());
        content_types.declare_seeds(&defs.content_types);
        content_types.load().await?;

        let taxonomies = TaxonomyRegistry::new(pool.clone(), cache.clone());
        taxonomies.declare_seeds(&defs.taxonomies);
        taxonomies.load().await?;

        let email = match &config.smtp_host {
            Some(host) => Some(EmailService::new(
                host,
                config.smtp_port,
                config.smtp_username.as_deref(),
                config.smtp_password.as_deref(),
                &config.smtp_encryption,
                config.smtp_from_email.clone(),
                config.site_url.clone(),
            )?),
            None => {
                info!("SMTP not configured, email delivery disabled");
                None
            }
        };

        let apm = match &config.apm_endpoint {
            Some(endpoint) => Some(ApmService::new(endpoint.clone())?),
            None => None,
        };

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                redis,
                cache,
                hooks,
                queue,
                notifications,
                plugins,
                updates,
                content_types,
                taxonomies,
                audit,
                email,
                apm,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.inner.cache
    }

    pub fn hooks(&self) -> &Arc<HookBus> {
        &self.inner.hooks
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.inner.queue
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.inner.notifications
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.inner.plugins
    }

    pub fn updates(&self) -> &UpdateManager {
        &self.inner.updates
    }

    pub fn content_types(&self) -> &ContentTypeRegistry {
        &self.inner.content_types
    }

    pub fn taxonomies(&self) -> &TaxonomyRegistry {
        &self.inner.taxonomies
    }

    pub fn audit(&self) -> &AuditService {
        &self.inner.audit
    }

    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    pub fn apm(&self) -> Option<&ApmService> {
        self.inner.apm.as_ref()
    }

    /// Whether Postgres answers a trivial query.
    pub async fn postgres_healthy(&self) -> bool {
        db::check_health(&self.inner.pool).await
    }

    /// Whether Redis answers a PING.
    pub async fn redis_healthy(&self) -> bool {
        match self.inner.redis.get_multiplexed_async_connection().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish()
    }
}

/// Mirror lifecycle events into the audit trail. Writes happen on a
/// spawned task so emitters never block on the database.
fn register_audit_subscriber(hooks: &Arc<HookBus>, audit: AuditService) {
    hooks.subscribe("audit", 100, move |event| {
        let (action, entity_type, entity_id, details) = match event {
            HookEvent::NotificationSent {
                notification_id,
                key,
                recipient_ids,
            } => (
                "notification.sent",
                "notification",
                notification_id.to_string(),
                json!({"key": key, "recipients": recipient_ids.len()}),
            ),
            HookEvent::PluginActivated { slug } => (
                "plugin.activated",
                "plugin",
                slug.clone(),
                json!({}),
            ),
            HookEvent::PluginDeactivated { slug } => (
                "plugin.deactivated",
                "plugin",
                slug.clone(),
                json!({}),
            ),
            HookEvent::PluginUpdating {
                slug,
                from_version,
                to_version,
            } => (
                "plugin.updating",
                "plugin",
                slug.clone(),
                json!({"from": from_version, "to": to_version}),
            ),
            HookEvent::PluginDeleted { slug } => (
                "plugin.deleted",
                "plugin",
                slug.clone(),
                json!({}),
            ),
            // Read/dismiss are per-user noise; not audited.
            HookEvent::NotificationRead { .. } | HookEvent::NotificationDismissed { .. } => {
                return Ok(());
            }
        };

        let audit = audit.clone();
        tokio::spawn(async move {
            if let Err(e) = audit
                .record(action, entity_type, &entity_id, None, details)
                .await
            {
                warn!(action = %action, error = %e, "audit write failed");
            }
        });

        Ok(())
    });
}
