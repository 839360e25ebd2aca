//! Notification feed and read-state endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::models::UserNotification;
use crate::state::AppState;

/// Feed page size bounds.
const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
struct FeedParams {
    limit: Option<i64>,
    unread_only: Option<bool>,
}

async fn feed(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<Value>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let unread_only = params.unread_only.unwrap_or(false);

    let items: Vec<UserNotification> = state
        .notifications()
        .feed(user_id, limit, unread_only)
        .await?;

    Ok(Json(json!({ "data": items })))
}

async fn show(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserNotification>> {
    let notification = state
        .notifications()
        .find_for_user(id, user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(notification))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    if !state.notifications().mark_read(id, user_id).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({"message": "Notification marked as read"})))
}

async fn dismiss(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    if !state.notifications().dismiss(id, user_id).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({"message": "Notification dismissed"})))
}

async fn mark_all_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> AppResult<Json<Value>> {
    let count = state.notifications().mark_all_read(user_id).await?;
    Ok(Json(
        json!({"message": "All notifications marked as read", "count": count}),
    ))
}

async fn dismiss_all(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> AppResult<Json<Value>> {
    let count = state.notifications().dismiss_all(user_id).await?;
    Ok(Json(
        json!({"message": "All notifications dismissed", "count": count}),
    ))
}

async fn unread_count(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> AppResult<Json<Value>> {
    let count = state.notifications().unread_count(user_id).await?;
    Ok(Json(json!({"count": count})))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(feed))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/dismiss-all", post(dismiss_all))
        .route("/notifications/{id}", get(show))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/notifications/{id}/dismiss", post(dismiss))
}
