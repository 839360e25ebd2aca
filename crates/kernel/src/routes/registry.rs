//! Content type and taxonomy endpoints.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::registry::FieldDefinition;
use crate::state::AppState;

async fn list_content_types(State(state): State<AppState>) -> AppResult<Json<Value>> {
    Ok(Json(json!({ "data": state.content_types().list() })))
}

async fn show_content_type(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> AppResult<Json<Value>> {
    let def = state.content_types().get(&handle).ok_or(AppError::NotFound)?;
    Ok(Json(json!({ "data": def })))
}

#[derive(Debug, Deserialize)]
struct SaveContentType {
    label: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: Vec<FieldDefinition>,
    #[serde(default = "empty_object")]
    settings: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

async fn save_content_type(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(body): Json<SaveContentType>,
) -> AppResult<Json<Value>> {
    if body.label.trim().is_empty() {
        return Err(AppError::Unprocessable(
            "label must not be empty".to_string(),
        ));
    }

    let def = state
        .content_types()
        .save(
            &handle,
            &body.label,
            body.description.as_deref(),
            &body.fields,
            &body.settings,
        )
        .await?;

    Ok(Json(json!({"message": "Content type saved", "data": def})))
}

async fn delete_content_type(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> AppResult<Json<Value>> {
    if !state.content_types().delete(&handle).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(
        json!({"message": "Content type and its items deleted"}),
    ))
}

async fn list_taxonomies(State(state): State<AppState>) -> AppResult<Json<Value>> {
    Ok(Json(json!({ "data": state.taxonomies().list() })))
}

async fn show_taxonomy(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> AppResult<Json<Value>> {
    let def = state.taxonomies().get(&handle).ok_or(AppError::NotFound)?;
    Ok(Json(json!({ "data": def })))
}

#[derive(Debug, Deserialize)]
struct SaveTaxonomy {
    label: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    hierarchical: bool,
    #[serde(default = "empty_object")]
    settings: Value,
}

async fn save_taxonomy(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(body): Json<SaveTaxonomy>,
) -> AppResult<Json<Value>> {
    if body.label.trim().is_empty() {
        return Err(AppError::Unprocessable(
            "label must not be empty".to_string(),
        ));
    }

    let def = state
        .taxonomies()
        .save(
            &handle,
            &body.label,
            body.description.as_deref(),
            body.hierarchical,
            &body.settings,
        )
        .await?;

    Ok(Json(json!({"message": "Taxonomy saved", "data": def})))
}

async fn delete_taxonomy(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> AppResult<Json<Value>> {
    if !state.taxonomies().delete(&handle).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(json!({"message": "Taxonomy deleted"})))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/content-types", get(list_content_types))
        .route(
            "/content-types/{handle}",
            get(show_content_type)
                .put(save_content_type)
                .delete(delete_content_type),
        )
        .route("/taxonomies", get(list_taxonomies))
        .route(
            "/taxonomies/{handle}",
            get(show_taxonomy).put(save_taxonomy).delete(delete_taxonomy),
        )
}
