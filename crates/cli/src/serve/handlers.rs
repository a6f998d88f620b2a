//! Route handlers: health, campaign queries, and lifecycle mutations.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pacer_orchestrator::{CampaignStatusView, OrchestratorError};
use pacer_storage::CampaignRecord;
use serde::Deserialize;

use super::json_error;
use super::state::AppState;

/// `OrchestratorError` rendered as a JSON error response.
pub(crate) struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, retry_after) = match &self.0 {
            OrchestratorError::InvalidTransition { .. }
            | OrchestratorError::NotReconcilable { .. } => (StatusCode::CONFLICT, None),
            OrchestratorError::CampaignNotFound { .. } => (StatusCode::NOT_FOUND, None),
            OrchestratorError::Adapter(e) if e.is_recoverable() => {
                (StatusCode::SERVICE_UNAVAILABLE, e.retry_after())
            }
            OrchestratorError::Adapter(_) => (StatusCode::BAD_GATEWAY, None),
            OrchestratorError::Inconsistent { .. } | OrchestratorError::Storage(_) => {
                tracing::error!(error = %self.0, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let mut body = serde_json::json!({ "error": self.0.to_string() });
        if let Some(delay) = retry_after {
            body["retry_after"] = delay.as_secs().into();
        }
        let mut response = (status, Json(body)).into_response();
        if let Some(delay) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&delay.as_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Body of every mutation request.
#[derive(Debug, Deserialize)]
pub(crate) struct MutationRequest {
    actor: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    team: Option<String>,
}

fn view(record: &CampaignRecord) -> Json<CampaignStatusView> {
    Json(CampaignStatusView::from(record))
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /campaigns?team=<id>
pub(crate) async fn handle_list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let campaigns = state
        .orchestrator
        .list_campaigns(query.team.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "campaigns": campaigns })))
}

/// GET /campaigns/{id}
pub(crate) async fn handle_get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CampaignStatusView>, ApiError> {
    Ok(Json(state.orchestrator.get_status(&id).await?))
}

/// GET /campaigns/{id}/audit
pub(crate) async fn handle_audit_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.orchestrator.audit_log(&id).await?;
    Ok(Json(serde_json::json!({ "entries": entries })))
}

/// POST /campaigns/{id}/launch
pub(crate) async fn handle_launch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MutationRequest>,
) -> Result<Json<CampaignStatusView>, ApiError> {
    let record = state.orchestrator.launch(&id, &body.actor).await?;
    Ok(view(&record))
}

/// POST /campaigns/{id}/pause
pub(crate) async fn handle_pause(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MutationRequest>,
) -> Result<Json<CampaignStatusView>, ApiError> {
    let record = state
        .orchestrator
        .pause(&id, &body.actor, body.reason.as_deref())
        .await?;
    Ok(view(&record))
}

/// POST /campaigns/{id}/resume
pub(crate) async fn handle_resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MutationRequest>,
) -> Result<Json<CampaignStatusView>, ApiError> {
    let record = state.orchestrator.resume(&id, &body.actor).await?;
    Ok(view(&record))
}

/// POST /campaigns/{id}/archive
pub(crate) async fn handle_archive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MutationRequest>,
) -> Result<Json<CampaignStatusView>, ApiError> {
    let record = state
        .orchestrator
        .archive(&id, &body.actor, body.reason.as_deref())
        .await?;
    Ok(view(&record))
}
