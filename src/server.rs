use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Latency ─────────────────────────────────────────────
        .route("/api/latency", get(handlers::latency::get_latency))
        .route(
            "/api/latency/stream",
            get(handlers::latency::latency_stream),
        )
        .route("/api/sampler", get(handlers::latency::sampler_status))
        // ── Settings ────────────────────────────────────────────
        .route(
            "/api/settings",
            get(handlers::settings::get_settings)
                .post(handlers::settings::update_settings),
        )
        // ── Load generator control ──────────────────────────────
        .route("/api/load/start", post(handlers::load::start_load))
        .route("/api/load/stop", post(handlers::load::stop_load_handler))
        .route("/api/load/status", get(handlers::load::load_status))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        .layer(CorsLayer::permissive())
}
