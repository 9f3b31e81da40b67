//! Server-Sent Events (SSE) broadcaster
//!
//! Streams real-time session events to connected clients.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use super::AppState;
use bss_common::events::SessionEvent;

/// GET /api/v1/events - SSE event stream
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    // Subscribe to the event broadcast
    let rx = state.service.events().subscribe();

    // Convert broadcast receiver to stream
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => {
                // Serialize event to JSON
                match serde_json::to_string(&event) {
                    Ok(json) => Some(Ok(Event::default()
                        .event(event_type_str(&event))
                        .data(json))),
                    Err(e) => {
                        warn!("Failed to serialize event: {e}");
                        None
                    }
                }
            }
            Err(e) => {
                // BroadcastStream error (lagged or closed)
                warn!("SSE stream error: {e:?}");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Extract event type string from SessionEvent
fn event_type_str(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::CapabilityResolved { .. } => "CapabilityResolved",
        SessionEvent::ModeChanged { .. } => "ModeChanged",
        SessionEvent::PhaseChanged { .. } => "PhaseChanged",
        SessionEvent::TrackScanned { .. } => "TrackScanned",
        SessionEvent::PreviewResolved { .. } => "PreviewResolved",
        SessionEvent::FlipDetected { .. } => "FlipDetected",
        SessionEvent::PlaybackStarted { .. } => "PlaybackStarted",
        SessionEvent::PlaybackEnded { .. } => "PlaybackEnded",
        SessionEvent::PlaybackFailed { .. } => "PlaybackFailed",
        SessionEvent::BingoTrackStarted { .. } => "BingoTrackStarted",
        SessionEvent::BingoTrackSkipped { .. } => "BingoTrackSkipped",
        SessionEvent::BingoProgress { .. } => "BingoProgress",
        SessionEvent::BingoStateChanged { .. } => "BingoStateChanged",
        SessionEvent::BingoExhausted { .. } => "BingoExhausted",
    }
}
