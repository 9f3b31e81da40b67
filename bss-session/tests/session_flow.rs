//! End-to-end single-track rounds over in-memory fakes.

mod common;

use std::sync::Arc;

use bss_common::events::{EventBus, Phase, SessionErrorKind};
use bss_common::types::AccountCapability;
use bss_session::gate::OrientationPermission;
use bss_session::playback::PlaybackDriver;
use bss_session::session::{PlaybackSession, SessionStateMachine};

use common::{FailingPreviewSource, RecordingBackend, TablePreviewSource};

const TRACK_ID: &str = "4uLU6hMCjMI75M1A2tKUQC";
const TRACK_URL: &str = "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc";
const PREVIEW: &str = "https://p.scdn.co/mp3-preview/clip";

fn free_machine(
    resolver: Arc<TablePreviewSource>,
    backend: Arc<RecordingBackend>,
) -> SessionStateMachine {
    let local = Arc::new(PlaybackDriver::new(backend));
    SessionStateMachine::new(AccountCapability::Free, resolver, None, local, EventBus::new())
}

#[tokio::test]
async fn free_path_scan_flip_play_done_and_back_to_scanning() {
    let resolver = Arc::new(TablePreviewSource::new(&[(TRACK_ID, Some(PREVIEW))]));
    let backend = Arc::new(RecordingBackend::default());
    let mut machine = free_machine(resolver, backend.clone());

    machine.begin_scan().await.unwrap();
    assert_eq!(*machine.phase(), Phase::Scanning);

    machine.on_scan(TRACK_URL).await.unwrap();
    assert_eq!(*machine.phase(), Phase::ReadyToFlip);
    assert_eq!(
        machine.session().resolved_preview_url.as_deref(),
        Some(PREVIEW)
    );

    machine.confirm_ready(OrientationPermission::Granted).unwrap();
    assert_eq!(*machine.phase(), Phase::WaitingForFlip);
    // The reveal is withheld: nothing has played yet.
    assert!(backend.plays().is_empty());

    machine.on_flipped().await.unwrap();
    assert_eq!(*machine.phase(), Phase::PreviewPlaying);
    assert_eq!(backend.plays(), vec![format!("play preview {PREVIEW}")]);

    machine.on_playback_ended(true).await.unwrap();
    assert_eq!(*machine.phase(), Phase::Done);

    // "Next" re-enters Scanning with the round fully cleared.
    machine.next_round().await.unwrap();
    assert_eq!(*machine.phase(), Phase::Scanning);
    assert_eq!(*machine.session(), PlaybackSession::default());
}

#[tokio::test]
async fn premium_path_goes_straight_to_remote_playing() {
    let resolver = Arc::new(TablePreviewSource::new(&[(TRACK_ID, Some(PREVIEW))]));
    let remote_backend = Arc::new(RecordingBackend::default());
    let local_backend = Arc::new(RecordingBackend::default());
    let remote = Arc::new(PlaybackDriver::new(remote_backend.clone()));
    let local = Arc::new(PlaybackDriver::new(local_backend.clone()));
    let mut machine = SessionStateMachine::new(
        AccountCapability::Premium {
            device_id: "dev-1".into(),
        },
        resolver.clone(),
        Some(remote),
        local,
        EventBus::new(),
    );

    machine.begin_scan().await.unwrap();
    machine.on_scan(TRACK_URL).await.unwrap();

    assert_eq!(*machine.phase(), Phase::RemotePlaying);
    // No preview resolution and no flip gating anywhere on this path.
    assert_eq!(resolver.call_count(), 0);
    assert_eq!(
        remote_backend.plays(),
        vec![format!("play remote {TRACK_ID}")]
    );
    assert!(local_backend.plays().is_empty());

    machine.on_playback_ended(true).await.unwrap();
    assert_eq!(*machine.phase(), Phase::Done);
}

#[tokio::test]
async fn non_track_payload_is_a_scan_format_error() {
    let resolver = Arc::new(TablePreviewSource::new(&[]));
    let backend = Arc::new(RecordingBackend::default());
    let mut machine = free_machine(resolver, backend);

    machine.begin_scan().await.unwrap();
    machine.on_scan("https://example.com/not-a-track").await.unwrap();
    assert_eq!(
        *machine.phase(),
        Phase::Error {
            kind: SessionErrorKind::ScanFormat
        }
    );

    // Only an explicit retry leaves the error state.
    machine.begin_scan().await.unwrap();
    assert_eq!(*machine.phase(), Phase::Scanning);
}

#[tokio::test]
async fn playlist_payload_is_not_a_single_mode_track() {
    let resolver = Arc::new(TablePreviewSource::new(&[]));
    let backend = Arc::new(RecordingBackend::default());
    let mut machine = free_machine(resolver, backend);

    machine.begin_scan().await.unwrap();
    machine
        .on_scan("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M")
        .await
        .unwrap();
    assert_eq!(
        *machine.phase(),
        Phase::Error {
            kind: SessionErrorKind::ScanFormat
        }
    );
}

#[tokio::test]
async fn missing_preview_returns_to_scanning_not_error() {
    // Resolver answers, but with "no preview for this track".
    let resolver = Arc::new(TablePreviewSource::new(&[(TRACK_ID, None)]));
    let backend = Arc::new(RecordingBackend::default());
    let mut machine = free_machine(resolver, backend.clone());

    machine.begin_scan().await.unwrap();
    machine.on_scan(TRACK_URL).await.unwrap();

    assert_eq!(*machine.phase(), Phase::Scanning);
    assert_eq!(*machine.session(), PlaybackSession::default());
    assert!(backend.plays().is_empty());
}

#[tokio::test]
async fn repeated_resolution_failure_is_a_retryable_error() {
    let backend = Arc::new(RecordingBackend::default());
    let local = Arc::new(PlaybackDriver::new(backend));
    let mut machine = SessionStateMachine::new(
        AccountCapability::Free,
        Arc::new(FailingPreviewSource),
        None,
        local,
        EventBus::new(),
    );

    machine.begin_scan().await.unwrap();
    machine.on_scan(TRACK_URL).await.unwrap();
    assert_eq!(
        *machine.phase(),
        Phase::Error {
            kind: SessionErrorKind::Resolution
        }
    );
}

#[tokio::test]
async fn denied_orientation_grant_blocks_the_flip_flow() {
    let resolver = Arc::new(TablePreviewSource::new(&[(TRACK_ID, Some(PREVIEW))]));
    let backend = Arc::new(RecordingBackend::default());
    let mut machine = free_machine(resolver, backend.clone());

    machine.begin_scan().await.unwrap();
    machine.on_scan(TRACK_URL).await.unwrap();
    machine.confirm_ready(OrientationPermission::Denied).unwrap();

    assert_eq!(
        *machine.phase(),
        Phase::Error {
            kind: SessionErrorKind::Permission
        }
    );
    assert!(backend.plays().is_empty());
}

#[tokio::test]
async fn rejected_playback_abandons_the_track() {
    let resolver = Arc::new(TablePreviewSource::new(&[(TRACK_ID, Some(PREVIEW))]));
    let backend = Arc::new(RecordingBackend::default());
    let mut machine = free_machine(resolver, backend.clone());

    machine.begin_scan().await.unwrap();
    machine.on_scan(TRACK_URL).await.unwrap();
    machine.confirm_ready(OrientationPermission::Granted).unwrap();

    backend.fail_next_play();
    machine.on_flipped().await.unwrap();

    assert_eq!(
        *machine.phase(),
        Phase::Error {
            kind: SessionErrorKind::Playback
        }
    );
    // The failed source is not silently retried.
    assert!(backend.plays().is_empty());
}

#[tokio::test]
async fn stale_ended_events_are_ignored() {
    let resolver = Arc::new(TablePreviewSource::new(&[]));
    let backend = Arc::new(RecordingBackend::default());
    let mut machine = free_machine(resolver, backend);

    machine.begin_scan().await.unwrap();
    machine.on_playback_ended(true).await.unwrap();
    assert_eq!(*machine.phase(), Phase::Scanning);
}
