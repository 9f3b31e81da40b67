//! REST API and SSE control surface
//!
//! Thin JSON handlers over the service layer. Error mapping converts every
//! recovered failure into one of a small set of user-facing outcomes; raw
//! transport detail stays in the logs.

pub mod handlers;
pub mod sse;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::SessionService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SessionService>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(handlers::health))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                .route("/state", get(handlers::get_state))
                .route("/events", get(sse::event_stream))
                .route("/mode", post(handlers::set_mode))
                .route("/scan", post(handlers::scan))
                // Single-track flow
                .route("/session/ready", post(handlers::session_ready))
                .route("/session/orientation", post(handlers::orientation))
                .route("/session/next", post(handlers::session_next))
                .route("/session/reset", post(handlers::session_reset))
                .route("/playback/pause", post(handlers::playback_pause))
                .route("/playback/resume", post(handlers::playback_resume))
                // Bingo flow
                .route("/bingo/resume", post(handlers::bingo_resume))
                .route("/bingo/pause", post(handlers::bingo_pause))
                .route("/bingo/back", post(handlers::bingo_back))
                .route("/bingo/history", get(handlers::bingo_history)),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
