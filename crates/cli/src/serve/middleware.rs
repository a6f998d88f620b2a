//! HTTP middleware: API key authentication.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::state::AppState;

/// API key authentication middleware.
///
/// If an API key is configured, all requests (except /health) must include
/// either `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected_key = match &state.api_key {
        Some(k) => k,
        None => return next.run(request).await,
    };

    // /health is exempt from auth (for load balancer health checks)
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "));
    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    let matches = bearer.or(header_key).map(|key| key == expected_key);

    match matches {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "rejected request with invalid API key");
            super::json_error(StatusCode::FORBIDDEN, "invalid API key").into_response()
        }
        None => super::json_error(StatusCode::UNAUTHORIZED, "authentication required").into_response(),
    }
}
