//! Server-sent event streams of `CampaignEvent`s.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use pacer_core::CampaignEvent;
use tokio_stream::{Stream, StreamExt as _};

use super::handlers::ApiError;
use super::state::AppState;

fn sse<St>(events: St) -> impl IntoResponse
where
    St: Stream<Item = CampaignEvent> + Send + 'static,
{
    let stream = events.map(|event| Event::default().event(event.kind()).json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /campaigns/{id}/events
pub(crate) async fn handle_campaign_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // 404 for unknown campaigns instead of a stream that never yields.
    state.orchestrator.get_status(&id).await?;
    Ok(sse(state.events.campaign_events(&id)))
}

/// GET /teams/{team}/events
pub(crate) async fn handle_team_events(
    State(state): State<Arc<AppState>>,
    Path(team): Path<String>,
) -> impl IntoResponse {
    sse(state.events.team_events(&team))
}
