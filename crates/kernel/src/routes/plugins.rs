//! Plugin administration endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::PluginRecord;
use crate::state::AppState;

/// One row in the plugin listing: discovery state merged with the
/// database record when installed.
#[derive(Debug, Serialize)]
struct PluginView {
    slug: String,
    name: String,
    description: String,
    version: String,
    installed: bool,
    is_active: bool,
    /// Version recorded at install time; differs from `version` when the
    /// files on disk were replaced outside the update manager.
    installed_version: Option<String>,
}

async fn list(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let discovered = state.plugins().discover().await.map_err(AppError::from)?;
    let records = PluginRecord::list(state.pool()).await?;

    let mut views: Vec<PluginView> = Vec::with_capacity(discovered.len());
    for (slug, manifest) in &discovered {
        let record = records.iter().find(|r| &r.slug == slug);
        views.push(PluginView {
            slug: slug.clone(),
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            version: manifest.version.clone(),
            installed: record.is_some(),
            is_active: record.is_some_and(|r| r.is_active),
            installed_version: record.map(|r| r.version.clone()),
        });
    }

    // Installed plugins whose files vanished still show up, flagged by
    // having no on-disk version.
    for record in &records {
        if !discovered.contains_key(&record.slug) {
            views.push(PluginView {
                slug: record.slug.clone(),
                name: record.name.clone(),
                description: String::new(),
                version: record.version.clone(),
                installed: true,
                is_active: record.is_active,
                installed_version: Some(record.version.clone()),
            });
        }
    }

    views.sort_by(|a, b| a.slug.cmp(&b.slug));

    Ok(Json(json!({ "data": views })))
}

async fn show(State(state): State<AppState>, Path(slug): Path<String>) -> AppResult<Json<Value>> {
    let manifest = state.plugins().get_plugin(&slug);
    let record = PluginRecord::find_by_slug(state.pool(), &slug).await?;

    if manifest.is_none() && record.is_none() {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({"manifest": manifest, "record": record})))
}

async fn install(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Value>> {
    let record = state.plugins().install(&slug).await?;
    Ok(Json(json!({"message": "Plugin installed", "data": record})))
}

async fn activate(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Value>> {
    let applied = state.plugins().activate(&slug).await?;
    Ok(Json(
        json!({"message": "Plugin activated", "migrations_applied": applied}),
    ))
}

async fn deactivate(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Value>> {
    let report = state.plugins().deactivate(&slug).await?;
    Ok(Json(json!({
        "message": "Plugin deactivated",
        "rolled_back": report.rolled_back,
        "rollback_errors": report.rollback_errors,
    })))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    /// When false, only the registry row goes; files stay on disk.
    remove_files: Option<bool>,
}

async fn remove(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<DeleteParams>,
) -> AppResult<Json<Value>> {
    state
        .plugins()
        .delete(&slug, params.remove_files.unwrap_or(true))
        .await?;
    Ok(Json(json!({"message": "Plugin deleted"})))
}

async fn check_update(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Value>> {
    match state.updates().check(&slug).await? {
        Some(info) => Ok(Json(json!({"update_available": true, "data": info}))),
        None => Ok(Json(json!({"update_available": false}))),
    }
}

async fn update(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<Value>> {
    let updated = state.updates().update(&slug).await?;
    let message = if updated {
        "Plugin updated"
    } else {
        "Plugin already up to date"
    };
    Ok(Json(json!({"message": message, "updated": updated})))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plugins", get(list))
        .route("/plugins/{slug}", get(show).delete(remove))
        .route("/plugins/{slug}/install", post(install))
        .route("/plugins/{slug}/activate", post(activate))
        .route("/plugins/{slug}/deactivate", post(deactivate))
        .route("/plugins/{slug}/check-update", get(check_update))
        .route("/plugins/{slug}/update", post(update))
}
