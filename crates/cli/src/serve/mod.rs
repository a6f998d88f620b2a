//! `pacer serve` -- HTTP JSON API over the campaign orchestrator.
//!
//! Wires the in-memory store, the adapter registry, the broadcast
//! notifier, and the tick driver together, recovers reconciliation for
//! live campaigns, then serves requests until Ctrl+C.
//!
//! Endpoints:
//! - GET  /health                       - Server status (exempt from auth)
//! - GET  /campaigns?team=<id>          - Campaign status views
//! - GET  /campaigns/{id}               - One campaign's status view
//! - GET  /campaigns/{id}/audit         - Ordered audit entries
//! - POST /campaigns/{id}/launch        - `{actor}`
//! - POST /campaigns/{id}/pause         - `{actor, reason?}`
//! - POST /campaigns/{id}/resume        - `{actor}`
//! - POST /campaigns/{id}/archive       - `{actor, reason?}`
//! - GET  /campaigns/{id}/events        - SSE stream for one campaign
//! - GET  /teams/{team}/events          - SSE stream for one owning team
//!
//! All non-SSE responses use Content-Type: application/json.

mod events;
mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use pacer_channels::{AdapterRegistry, ChannelAdapter, ScriptedAdapter};
use pacer_core::Channel;
use pacer_orchestrator::{
    BroadcastNotifier, Orchestrator, ReconciliationScheduler, TickQueue,
};
use pacer_storage::InMemoryStorage;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::events::{handle_campaign_events, handle_team_events};
use self::handlers::{
    handle_archive, handle_audit_log, handle_get_status, handle_health, handle_launch,
    handle_list_campaigns, handle_not_found, handle_pause, handle_resume,
};
use self::middleware::auth_middleware;
use self::state::AppState;
use crate::config::PacerConfig;
use crate::seed::SeedFile;

/// Maximum request body size: 64 KB. Mutation bodies are tiny.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

pub(crate) struct ServeOptions {
    pub(crate) config: PacerConfig,
    pub(crate) port: Option<u16>,
    pub(crate) campaigns: Option<PathBuf>,
    /// Use scripted in-process vendors instead of the real APIs.
    pub(crate) dry_run: bool,
}

fn router(state: Arc<AppState>) -> Router {
    // CORS: permissive; the API key is the access control.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/campaigns", get(handle_list_campaigns))
        .route("/campaigns/{id}", get(handle_get_status))
        .route("/campaigns/{id}/audit", get(handle_audit_log))
        .route("/campaigns/{id}/launch", post(handle_launch))
        .route("/campaigns/{id}/pause", post(handle_pause))
        .route("/campaigns/{id}/resume", post(handle_resume))
        .route("/campaigns/{id}/archive", post(handle_archive))
        .route("/campaigns/{id}/events", get(handle_campaign_events))
        .route("/teams/{team}/events", get(handle_team_events))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

fn adapter_registry(config: &PacerConfig, dry_run: bool) -> AdapterRegistry {
    if dry_run {
        let mut registry =
            AdapterRegistry::new(Arc::new(pacer_channels::StaticCredentialStore::new()));
        for channel in Channel::ALL {
            registry.register_instance(
                channel,
                Arc::new(ScriptedAdapter::new(channel)) as Arc<dyn ChannelAdapter>,
            );
        }
        return registry;
    }
    AdapterRegistry::with_vendors(
        Arc::new(config.credential_store()),
        config.orchestrator.vendor_timeout(),
    )
}

/// Start the HTTP server and the reconciliation driver.
pub(crate) async fn start_server(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let ServeOptions {
        config,
        port,
        campaigns,
        dry_run,
    } = options;

    let storage = Arc::new(InMemoryStorage::new());
    if let Some(path) = &campaigns {
        let count = SeedFile::load(path)?.apply(storage.as_ref()).await?;
        tracing::info!(count, path = %path.display(), "campaigns loaded");
    }

    if dry_run {
        tracing::warn!("dry run: vendor calls are scripted, nothing reaches an ad platform");
    }
    let registry = adapter_registry(&config, dry_run);
    tracing::info!(channels = ?registry.channels(), "adapters registered");

    let events = Arc::new(BroadcastNotifier::new(config.server.event_buffer));
    let (ticks, driver) = TickQueue::channel();
    let orchestrator = Arc::new(Orchestrator::new(
        storage,
        Arc::new(registry),
        events.clone(),
        Arc::new(ticks),
        config.orchestrator.clone(),
    ));

    let reconciler = Arc::new(ReconciliationScheduler::new(Arc::clone(&orchestrator)));
    tokio::spawn(driver.run(reconciler));
    orchestrator.recover().await?;

    if config.server.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    let state = Arc::new(AppState {
        orchestrator,
        events,
        api_key: config.server.api_key.clone(),
    });
    let app = router(state);

    let port = port.unwrap_or(config.server.port);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("pacer listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C; shutting down");
        return;
    }
    tracing::info!("received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use pacer_channels::AdapterError;
    use pacer_core::{CampaignOperation, ExternalIds};
    use pacer_orchestrator::{OrchestratorConfig, RecordingScheduler};
    use pacer_storage::{CampaignRecord, CampaignStorage};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        app: Router,
        adapter: Arc<ScriptedAdapter>,
    }

    async fn test_app(api_key: Option<&str>) -> TestApp {
        let storage = Arc::new(InMemoryStorage::new());
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .insert_campaign(
                &mut snap,
                CampaignRecord::scheduled("c1", "Spring sale", Channel::Meta, "team-a", "alice"),
            )
            .await
            .unwrap();
        let mut live =
            CampaignRecord::scheduled("c2", "Summer sale", Channel::Meta, "team-b", "bob");
        live.state = pacer_core::CampaignState::Launched;
        live.external_ids = Some(ExternalIds::new("a1", "v2"));
        storage.insert_campaign(&mut snap, live).await.unwrap();
        storage.commit_snapshot(snap).await.unwrap();

        let adapter = Arc::new(ScriptedAdapter::new(Channel::Meta));
        let mut registry =
            AdapterRegistry::new(Arc::new(pacer_channels::StaticCredentialStore::new()));
        registry.register_instance(Channel::Meta, adapter.clone() as Arc<dyn ChannelAdapter>);

        let events = Arc::new(BroadcastNotifier::new(16));
        let orchestrator = Arc::new(Orchestrator::new(
            storage,
            Arc::new(registry),
            events.clone(),
            Arc::new(RecordingScheduler::new()),
            OrchestratorConfig::default(),
        ));
        let state = Arc::new(AppState {
            orchestrator,
            events,
            api_key: api_key.map(str::to_string),
        });
        TestApp {
            app: router(state),
            adapter,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_open_even_with_api_key() {
        let t = test_app(Some("secret")).await;
        let (status, body) = send(&t.app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn api_key_is_enforced() {
        let t = test_app(Some("secret")).await;

        let (status, _) = send(&t.app, get("/campaigns")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let wrong = Request::get("/campaigns")
            .header("x-api-key", "nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&t.app, wrong).await.0, StatusCode::FORBIDDEN);

        let bearer = Request::get("/campaigns")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&t.app, bearer).await.0, StatusCode::OK);

        let header_key = Request::get("/campaigns")
            .header("x-api-key", "secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&t.app, header_key).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn list_filters_by_team() {
        let t = test_app(None).await;
        let (status, body) = send(&t.app, get("/campaigns?team=team-b")).await;
        assert_eq!(status, StatusCode::OK);
        let campaigns = body["campaigns"].as_array().unwrap();
        assert_eq!(campaigns.len(), 1);
        assert_eq!(campaigns[0]["campaign_id"], "c2");

        let (_, body) = send(&t.app, get("/campaigns")).await;
        assert_eq!(body["campaigns"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn launch_then_conflict() {
        let t = test_app(None).await;
        let (status, body) = send(&t.app, post("/campaigns/c1/launch", json!({"actor": "alice"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "launched");
        assert_eq!(body["external_ids"]["campaign_id"], "c1");

        let (status, body) = send(&t.app, post("/campaigns/c1/launch", json!({"actor": "alice"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("in state launched"));

        let (status, body) = send(&t.app, get("/campaigns/c1/audit")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entries"][0]["event_kind"], "launch");
    }

    #[tokio::test]
    async fn pause_with_reason_and_status_view() {
        let t = test_app(None).await;
        let (status, body) = send(
            &t.app,
            post("/campaigns/c2/pause", json!({"actor": "bob", "reason": "creative refresh"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "paused");

        let (_, body) = send(&t.app, get("/campaigns/c2")).await;
        assert_eq!(body["paused_reason"], "creative refresh");
    }

    #[tokio::test]
    async fn unknown_campaign_is_404() {
        let t = test_app(None).await;
        assert_eq!(send(&t.app, get("/campaigns/ghost")).await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            send(&t.app, post("/campaigns/ghost/pause", json!({"actor": "a"}))).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(send(&t.app, get("/campaigns/ghost/events")).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&t.app, get("/nope")).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn vendor_errors_map_to_gateway_statuses() {
        let t = test_app(None).await;
        t.adapter.fail_next(
            CampaignOperation::Launch,
            AdapterError::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            },
        );
        let response = t
            .app
            .clone()
            .oneshot(post("/campaigns/c1/launch", json!({"actor": "alice"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");

        t.adapter.fail_next(
            CampaignOperation::Launch,
            AdapterError::Auth {
                message: "bad token".into(),
            },
        );
        let (status, body) = send(&t.app, post("/campaigns/c1/launch", json!({"actor": "alice"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("bad token"));

        let (_, body) = send(&t.app, get("/campaigns/c1")).await;
        assert_eq!(body["state"], "failed");
    }

    #[tokio::test]
    async fn event_stream_is_sse() {
        let t = test_app(None).await;
        let response = t.app.clone().oneshot(get("/campaigns/c1/events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        let response = t.app.clone().oneshot(get("/teams/team-a/events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn archive_is_idempotent_over_http() {
        let t = test_app(None).await;
        for _ in 0..2 {
            let (status, body) =
                send(&t.app, post("/campaigns/c2/archive", json!({"actor": "ops"}))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["state"], "archived");
        }
        let (status, _) = send(&t.app, post("/campaigns/c2/resume", json!({"actor": "ops"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
