//! HTTP route handlers.
//!
//! Each module exposes `router()` returning a `Router<AppState>`; the
//! binary nests them under `/api` behind bearer auth, with `/health`
//! left open.

pub mod health;
pub mod notifications;
pub mod plugins;
pub mod preferences;
pub mod registry;

use axum::Router;

use crate::state::AppState;

/// All authenticated API routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(notifications::router())
        .merge(preferences::router())
        .merge(plugins::router())
        .merge(registry::router())
}
