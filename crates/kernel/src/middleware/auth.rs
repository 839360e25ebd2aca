//! Bearer token authentication.
//!
//! Every `/api` route requires `Authorization: Bearer <token>`. Tokens
//! resolve to user rows; the authenticated user id is attached as a
//! request extension for handlers to extract.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::models::User;
use crate::state::AppState;

/// The authenticated caller, available via `Extension<CurrentUser>`.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

/// Reject requests without a valid bearer token for an active user.
pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let raw_token = match auth_header {
        Some(v) if v.starts_with("Bearer ") => &v[7..],
        _ => return unauthorized("Authentication required"),
    };

    let user = match User::find_by_api_token(state.pool(), raw_token).await {
        Ok(Some(u)) => u,
        Ok(None) => return unauthorized("Invalid API token"),
        Err(e) => {
            tracing::error!(error = %e, "failed to look up API token");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({"message": "Internal server error"})),
            )
                .into_response();
        }
    };

    if !user.is_active() {
        return unauthorized("Account is blocked");
    }

    request.extensions_mut().insert(CurrentUser(user.id));
    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({"message": message})),
    )
        .into_response()
}
