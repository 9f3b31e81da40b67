//! Bingo draw engine loop under a paused clock.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tokio::time::timeout;

use bss_common::events::{EventBus, SessionEvent};
use bss_common::types::Track;
use bss_session::bingo::{BingoDrawEngine, BingoState};
use bss_session::playback::PlaybackDriver;

use common::{RecordingBackend, TablePreviewSource};

const CLIP: &str = "https://p.scdn.co/mp3-preview/clip";

fn track(id: &str, preview: Option<&str>) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        artists: vec!["Artist".to_string()],
        duration_ms: 180_000,
        preview_url: preview.map(str::to_string),
    }
}

fn engine_for(
    tracks: Vec<Track>,
    resolver: Arc<TablePreviewSource>,
    backend: Arc<RecordingBackend>,
    events: EventBus,
    countdown_secs: u64,
) -> Arc<Mutex<BingoDrawEngine>> {
    let driver = Arc::new(PlaybackDriver::new(backend));
    Arc::new(Mutex::new(
        BingoDrawEngine::new(tracks, resolver, driver, events, countdown_secs, 100)
            .with_rng(StdRng::seed_from_u64(42)),
    ))
}

#[tokio::test(start_paused = true)]
async fn plays_every_resolvable_track_once_then_exhausts() {
    let tracks: Vec<Track> = (0..5).map(|i| track(&format!("t{i}"), Some(CLIP))).collect();
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let engine = engine_for(
        tracks.clone(),
        Arc::new(TablePreviewSource::new(&[])),
        Arc::new(RecordingBackend::default()),
        events,
        2,
    );

    BingoDrawEngine::resume(&engine).await.unwrap();

    let mut started = Vec::new();
    loop {
        match timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(SessionEvent::BingoTrackStarted { track, .. })) => started.push(track.id),
            Ok(Ok(SessionEvent::BingoExhausted { .. })) => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event bus closed early: {e}"),
            Err(_) => panic!("draw loop stalled"),
        }
    }

    assert_eq!(started.len(), tracks.len());
    let unique: HashSet<&String> = started.iter().collect();
    assert_eq!(unique.len(), tracks.len(), "a track was drawn twice");

    let engine = engine.lock().await;
    assert_eq!(engine.state(), BingoState::Exhausted);
    assert_eq!(engine.status().played, tracks.len());
    assert_eq!(engine.status().remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_tracks_are_skipped_without_history() {
    // No structured preview and the resolver knows none of them.
    let tracks: Vec<Track> = (0..3).map(|i| track(&format!("t{i}"), None)).collect();
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let engine = engine_for(
        tracks,
        Arc::new(TablePreviewSource::new(&[])),
        Arc::new(RecordingBackend::default()),
        events,
        2,
    );

    BingoDrawEngine::resume(&engine).await.unwrap();

    let mut skipped = 0;
    loop {
        match timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(SessionEvent::BingoTrackSkipped { .. })) => skipped += 1,
            Ok(Ok(SessionEvent::BingoExhausted { .. })) => break,
            Ok(Ok(SessionEvent::BingoTrackStarted { .. })) => {
                panic!("nothing should have played")
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event bus closed early: {e}"),
            Err(_) => panic!("draw loop stalled"),
        }
    }

    assert_eq!(skipped, 3);
    let engine = engine.lock().await;
    assert_eq!(engine.status().played, 0);
    assert_eq!(engine.history().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn accounting_holds_with_a_mixed_pool() {
    // Two resolvable tracks, one without any preview anywhere.
    let tracks = vec![
        track("a", Some(CLIP)),
        track("b", None),
        track("c", Some(CLIP)),
    ];
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let engine = engine_for(
        tracks,
        Arc::new(TablePreviewSource::new(&[])),
        Arc::new(RecordingBackend::default()),
        events,
        2,
    );

    BingoDrawEngine::resume(&engine).await.unwrap();

    loop {
        match timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(SessionEvent::BingoExhausted { .. })) => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event bus closed early: {e}"),
            Err(_) => panic!("draw loop stalled"),
        }
    }

    let engine = engine.lock().await;
    let status = engine.status();
    assert_eq!(status.played, 2);
    assert_eq!(status.remaining, 0);
    // |history| + |remaining| = |all| - skipped
    assert_eq!(status.played + status.remaining, status.total - 1);
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_the_countdown_and_resume_continues() {
    let tracks: Vec<Track> = (0..2).map(|i| track(&format!("t{i}"), Some(CLIP))).collect();
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let engine = engine_for(
        tracks,
        Arc::new(TablePreviewSource::new(&[])),
        Arc::new(RecordingBackend::default()),
        events,
        30,
    );

    BingoDrawEngine::resume(&engine).await.unwrap();

    // Wait for the first window to open and tick at least once.
    let mut saw_progress = false;
    while !saw_progress {
        match timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(SessionEvent::BingoProgress { .. })) => saw_progress = true,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event bus closed early: {e}"),
            Err(_) => panic!("no progress tick arrived"),
        }
    }

    engine.lock().await.pause().await.unwrap();
    let frozen = engine.lock().await.status().elapsed_secs;

    // A stale timer firing now would advance the countdown; it must not.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(engine.lock().await.status().elapsed_secs, frozen);
    assert_eq!(engine.lock().await.state(), BingoState::Paused);

    BingoDrawEngine::resume(&engine).await.unwrap();
    let mut advanced = false;
    for _ in 0..50 {
        match timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(SessionEvent::BingoProgress { elapsed_secs, .. })) if elapsed_secs > frozen => {
                advanced = true;
                break;
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => panic!("event bus closed early: {e}"),
            Err(_) => panic!("countdown did not continue"),
        }
    }
    assert!(advanced, "countdown never advanced past the pause point");
}

#[tokio::test(start_paused = true)]
async fn natural_clip_end_cuts_the_window_short() {
    let tracks = vec![track("a", Some(CLIP)), track("b", Some(CLIP))];
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let engine = engine_for(
        tracks,
        Arc::new(TablePreviewSource::new(&[])),
        Arc::new(RecordingBackend::default()),
        events,
        3600,
    );

    BingoDrawEngine::resume(&engine).await.unwrap();

    // First window opens.
    loop {
        match timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(SessionEvent::BingoTrackStarted { .. })) => break,
            Ok(Ok(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    // The clip ends long before the (absurd) countdown would.
    BingoDrawEngine::on_track_ended(&engine).await;

    loop {
        match timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(SessionEvent::BingoTrackStarted { .. })) => break,
            Ok(Ok(_)) => {}
            other => panic!("second window never opened: {other:?}"),
        }
    }
}
