//! HTTP request handlers
//!
//! Implements the REST endpoints of the control surface. Handlers stay
//! thin: deserialize, call the service, serialize.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use bss_common::types::{GameMode, PlayedEntry};

use super::AppState;
use crate::service::{ScanOutcome, StateSnapshot};
use crate::Error;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    mode: GameMode,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    payload: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    orientation_granted: bool,
}

#[derive(Debug, Deserialize)]
pub struct OrientationRequest {
    beta: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    kind: String,
    retryable: bool,
}

/// Maps service errors onto user-facing HTTP outcomes.
///
/// Every failure reduces to retry-same, pick-different, or restart-mode;
/// transport detail goes to the logs, never to the client.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, retryable, message) = match &self.0 {
            Error::ScanFormat(_) => (
                StatusCode::BAD_REQUEST,
                "scan_format",
                false,
                "That code is not a recognized track or playlist link.",
            ),
            Error::InvalidState(_) => (
                StatusCode::CONFLICT,
                "invalid_state",
                false,
                "That action is not available right now.",
            ),
            Error::Resolution(_) => (
                StatusCode::BAD_GATEWAY,
                "resolution",
                true,
                "Could not reach the music service. Try again.",
            ),
            Error::Playback(_) => (
                StatusCode::BAD_GATEWAY,
                "playback",
                false,
                "Playback failed. Try another track.",
            ),
            Error::PermissionDenied => (
                StatusCode::FORBIDDEN,
                "permission",
                false,
                "Orientation access is required for the flip reveal.",
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                false,
                "Something went wrong.",
            ),
        };
        warn!("API error ({kind}): {}", self.0);
        let body = Json(ErrorResponse {
            error: message.to_string(),
            kind: kind.to_string(),
            retryable,
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "bss-session".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_state(State(state): State<AppState>) -> Json<StateSnapshot> {
    Json(state.service.state().await)
}

pub async fn set_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.set_mode(req.mode).await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn scan(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ScanOutcome>, ApiError> {
    let outcome = state.service.scan(&req.payload).await?;
    Ok(Json(outcome))
}

pub async fn session_ready(
    State(state): State<AppState>,
    Json(req): Json<ReadyRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.confirm_ready(req.orientation_granted).await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn orientation(
    State(state): State<AppState>,
    Json(req): Json<OrientationRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.orientation(req.beta).await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn session_next(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.next().await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn session_reset(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.reset().await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn playback_pause(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.playback_pause().await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn playback_resume(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.playback_resume().await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn bingo_resume(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.bingo_resume().await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn bingo_pause(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.bingo_pause().await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn bingo_back(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.service.bingo_back().await?;
    Ok(Json(StatusResponse::ok()))
}

pub async fn bingo_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<PlayedEntry>>, ApiError> {
    let history = state.service.bingo_history().await?;
    Ok(Json(history))
}
