//! Per-request timing export.

use std::time::Instant;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::state::AppState;

/// Time each request and ship the sample to APM, when configured.
///
/// The operation label uses the matched route path rather than the raw
/// URI so samples aggregate across path parameters.
pub async fn track_request(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(apm) = state.apm().cloned() else {
        return next.run(request).await;
    };

    let operation = format!(
        "{} {}",
        request.method(),
        request
            .extensions()
            .get::<axum::extract::MatchedPath>()
            .map_or_else(|| request.uri().path(), |p| p.as_str())
    );

    let start = Instant::now();
    let response = next.run(request).await;

    apm.record_timing(
        &operation,
        start.elapsed().as_millis(),
        Some(response.status().as_u16()),
    );

    response
}
