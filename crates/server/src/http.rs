//! HTTP router: the WebSocket upgrade route plus health/readiness probes.
//!
//! Sessions as a REST resource, chat/tools/MCP endpoints, admin config
//! reload, WebRTC and push-to-talk all sit outside the UI Shell boundary
//! (§1, §6.1) and are not reconstructed here.

use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket;

pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_origins, state.settings.server.cors_enabled);
    let ws_path = state.settings.server.ws_path.clone();

    Router::new()
        .route(&ws_path, get(websocket::upgrade))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled, allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "invalid CORS origin, dropping");
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Readiness confirms the four external services are configured, not that
/// they're reachable; a live probe would need its own timeouts and circuit
/// breaking, which this boundary doesn't own.
async fn readiness_check(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    let configured = !state.settings.transport.session_service_url.is_empty()
        && !state.settings.transport.asr_service_url.is_empty()
        && !state.settings.transport.generator_service_url.is_empty()
        && !state.settings.transport.tts_service_url.is_empty();

    let status = if configured { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(serde_json::json!({ "ready": configured })))
}
