//! Notification preference endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::state::AppState;

/// Stored preferences only; types without a row are enabled by default
/// and absent from this list.
async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> AppResult<Json<Value>> {
    let prefs = state.notifications().preferences().list(user_id).await?;
    Ok(Json(json!({ "data": prefs })))
}

#[derive(Debug, Deserialize)]
struct UpdatePreference {
    is_enabled: bool,
    #[serde(default = "default_true")]
    email_enabled: bool,
}

fn default_true() -> bool {
    true
}

async fn update(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(notification_type): Path<String>,
    Json(body): Json<UpdatePreference>,
) -> AppResult<Json<Value>> {
    let pref = state
        .notifications()
        .preferences()
        .set(
            user_id,
            &notification_type,
            body.is_enabled,
            body.email_enabled,
        )
        .await?;

    Ok(Json(json!({"message": "Preference saved", "data": pref})))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notification-preferences", get(list))
        .route("/notification-preferences/{type}", put(update))
}
