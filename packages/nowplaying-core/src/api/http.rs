//! HTTP route handlers.
//!
//! All handlers are thin - they read from the hub or the poller.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::bridge;
use crate::error::{NowPlayingError, NowPlayingResult};
use crate::poller::Poller;
use crate::protocol_constants::SERVICE_ID;
use crate::track::Track;

// ─────────────────────────────────────────────────────────────────────────────
// Routers
// ─────────────────────────────────────────────────────────────────────────────

/// Routes served by an edge process.
pub fn create_edge_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(edge_health))
        .route("/now-playing", get(now_playing))
        .route("/socket", get(ws_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Routes served by the producer process.
pub fn create_producer_router(poller: Arc<Poller>, shutdown: CancellationToken) -> Router {
    bridge::router(Arc::clone(&poller), shutdown)
        .merge(
            Router::new()
                .route("/health", get(producer_health))
                .route("/recently-played", get(recently_played))
                .with_state(poller),
        )
        .layer(TraceLayer::new_for_http())
}

/// CORS restricted to the configured origin prefixes, or open when none are
/// configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins = origins.to_vec();
    log::info!("[Server] CORS trusted origins: {:?}", origins);
    cors.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin_allowed(&origins, origin.to_str().unwrap_or(""))
    }))
}

/// Prefix match against the configured origins. An empty list allows any.
pub(crate) fn origin_allowed(origins: &[String], origin: &str) -> bool {
    origins.is_empty() || origins.iter().any(|allowed| origin.starts_with(allowed.as_str()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn edge_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "role": "edge",
        "listeners": state.hub.listeners(),
        "has_state": state.hub.has_state(),
    }))
}

/// Latest snapshot known to this edge.
async fn now_playing(State(state): State<AppState>) -> NowPlayingResult<Json<Arc<Track>>> {
    state.hub.state().map(Json).ok_or(NowPlayingError::NoState)
}

/// Last finished track, queried from the upstream on demand.
async fn recently_played(State(poller): State<Arc<Poller>>) -> NowPlayingResult<Json<Track>> {
    Ok(Json(poller.recently_played().await?))
}

async fn producer_health(State(poller): State<Arc<Poller>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "role": "producer",
        "track": poller.current().map(|track| track.id.clone()),
        "poll_interval_ms": poller.interval().as_millis() as u64,
    }))
}
