//! Bingo draw engine: playlist-wide random draw without replacement
//!
//! Draws tracks from a shrinking pool, plays each for a fixed window on
//! the local backend, appends to an append-only history, and auto-advances
//! with a fixed gap while running. Every countdown and gap timer carries
//! the draw-cycle id it was spawned for and verifies it against the live
//! cycle before acting, so a stale timer can never advance a paused or
//! torn-down engine.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bss_common::events::{EventBus, SessionEvent};
use bss_common::types::{PlaybackSource, PlayedEntry, Track};

use crate::playback::PlaybackDriver;
use crate::resolver::{resolve_with_retry, PreviewSource};
use crate::{Error, Result};

/// The undrawn pool plus play history for one bingo session.
///
/// `remaining` strictly shrinks by one per draw and is never repopulated;
/// `history` only grows, ordered by play time. At all times
/// |history| + |remaining| = |all| - skipped.
#[derive(Debug, Clone)]
pub struct BingoPool {
    all: Vec<Track>,
    remaining: Vec<Track>,
    history: Vec<PlayedEntry>,
    skipped: usize,
}

impl BingoPool {
    pub fn new(tracks: Vec<Track>) -> Self {
        // Unique by id; a playlist can list the same track twice.
        let mut seen = std::collections::HashSet::new();
        let tracks: Vec<Track> = tracks
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect();
        Self {
            remaining: tracks.clone(),
            all: tracks,
            history: Vec::new(),
            skipped: 0,
        }
    }

    /// Draw one track uniformly at random, without replacement.
    ///
    /// `None` signals exhaustion: every track has been drawn, and the pool
    /// is never refilled mid-session.
    pub fn draw(&mut self, rng: &mut impl Rng) -> Option<Track> {
        if self.remaining.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.remaining.len());
        Some(self.remaining.swap_remove(index))
    }

    pub fn record_played(&mut self, track: Track) {
        self.history.push(PlayedEntry {
            track,
            played_at: Utc::now(),
        });
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn total(&self) -> usize {
        self.all.len()
    }

    pub fn remaining_len(&self) -> usize {
        self.remaining.len()
    }

    pub fn history(&self) -> &[PlayedEntry] {
        &self.history
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Engine run-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BingoState {
    /// Pool loaded, nothing drawn yet
    Ready,
    /// Auto-advancing draw loop is live
    Running,
    /// Paused by the user; pool and history intact
    Paused,
    /// Every track drawn; terminal for the round
    Exhausted,
}

/// Snapshot of the engine for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct BingoStatus {
    pub state: BingoState,
    pub current: Option<Track>,
    pub elapsed_secs: u64,
    pub countdown_secs: u64,
    pub played: usize,
    pub remaining: usize,
    pub total: usize,
}

/// The playlist game loop.
///
/// Shared behind `Arc<Mutex<..>>`; the associated functions that spawn
/// timers take the shared handle so their callbacks can re-enter.
pub struct BingoDrawEngine {
    pool: BingoPool,
    state: BingoState,
    current: Option<Track>,
    elapsed_secs: u64,
    countdown_secs: u64,
    gap_ms: u64,
    resolver: Arc<dyn PreviewSource>,
    driver: Arc<PlaybackDriver>,
    events: EventBus,
    rng: StdRng,
    /// Monotonic draw-cycle id; bumped on every resume so outstanding
    /// timers from an old cycle can recognize they are stale.
    cycle_id: u64,
    /// Cancels all timers of the live cycle promptly.
    cycle_token: CancellationToken,
    /// Cancels just the current round's countdown.
    round_token: CancellationToken,
}

impl BingoDrawEngine {
    pub fn new(
        tracks: Vec<Track>,
        resolver: Arc<dyn PreviewSource>,
        driver: Arc<PlaybackDriver>,
        events: EventBus,
        countdown_secs: u64,
        gap_ms: u64,
    ) -> Self {
        Self {
            pool: BingoPool::new(tracks),
            state: BingoState::Ready,
            current: None,
            elapsed_secs: 0,
            countdown_secs,
            gap_ms,
            resolver,
            driver,
            events,
            rng: StdRng::from_entropy(),
            cycle_id: 0,
            cycle_token: CancellationToken::new(),
            round_token: CancellationToken::new(),
        }
    }

    /// Deterministic draws for tests.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn status(&self) -> BingoStatus {
        BingoStatus {
            state: self.state,
            current: self.current.clone(),
            elapsed_secs: self.elapsed_secs,
            countdown_secs: self.countdown_secs,
            played: self.pool.history().len(),
            remaining: self.pool.remaining_len(),
            total: self.pool.total(),
        }
    }

    pub fn history(&self) -> &[PlayedEntry] {
        self.pool.history()
    }

    pub fn state(&self) -> BingoState {
        self.state
    }

    /// Start or continue the draw loop: resume the current track if one is
    /// paused mid-window, otherwise draw the next.
    pub async fn resume(engine: &Arc<Mutex<Self>>) -> Result<()> {
        let mut guard = engine.lock().await;
        match guard.state {
            BingoState::Running => return Ok(()),
            BingoState::Exhausted => {
                return Err(Error::InvalidState("every track has been drawn".into()))
            }
            BingoState::Ready | BingoState::Paused => {}
        }

        guard.state = BingoState::Running;
        guard.cycle_id += 1;
        guard.cycle_token = CancellationToken::new();
        let cycle_id = guard.cycle_id;
        let cycle = guard.cycle_token.clone();
        guard.events.emit(SessionEvent::BingoStateChanged {
            running: true,
            timestamp: Utc::now(),
        });

        if guard.current.is_some() {
            // Continue the interrupted window from where it stopped.
            let round = cycle.child_token();
            guard.round_token = round.clone();
            let driver = guard.driver.clone();
            let elapsed = guard.elapsed_secs;
            drop(guard);
            if let Err(e) = driver.resume().await {
                warn!("Bingo resume: {e}");
            }
            Self::spawn_countdown(engine.clone(), cycle_id, cycle, round, elapsed);
        } else {
            drop(guard);
            let engine = engine.clone();
            tokio::spawn(async move {
                Self::advance(engine, cycle_id, cycle).await;
            });
        }
        Ok(())
    }

    /// Stop the countdown and the audio without discarding pool or
    /// history.
    pub async fn pause(&mut self) -> Result<()> {
        if self.state != BingoState::Running {
            return Err(Error::InvalidState("bingo is not running".into()));
        }
        // Kill the live cycle before touching audio so a stale timer can
        // never fire into the paused engine.
        self.cycle_token.cancel();
        self.state = BingoState::Paused;
        if let Err(e) = self.driver.pause().await {
            warn!("Bingo pause: {e}");
        }
        self.events.emit(SessionEvent::BingoStateChanged {
            running: false,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Tear the engine down before the pool is discarded ("back to
    /// playlist selection").
    pub async fn shutdown(&mut self) {
        self.cycle_token.cancel();
        self.current = None;
        if let Err(e) = self.driver.stop().await {
            warn!("Bingo shutdown: {e}");
        }
    }

    /// Natural "ended" from the audio backend, racing the countdown;
    /// whichever occurs first wins the window.
    pub async fn on_track_ended(engine: &Arc<Mutex<Self>>) {
        let (cycle_id, cycle, gap_ms) = {
            let guard = engine.lock().await;
            if guard.state != BingoState::Running || guard.current.is_none() {
                return;
            }
            guard.round_token.cancel();
            (guard.cycle_id, guard.cycle_token.clone(), guard.gap_ms)
        };
        Self::finish_round(engine.clone(), cycle_id, cycle, gap_ms).await;
    }

    /// Draw-resolve-play until a track starts, the pool exhausts, or the
    /// cycle goes stale. Unresolved draws are skipped (not counted in
    /// history) and the loop immediately draws again.
    async fn advance(engine: Arc<Mutex<Self>>, cycle_id: u64, cycle: CancellationToken) {
        loop {
            if cycle.is_cancelled() {
                return;
            }

            let (resolver, driver, events, drawn) = {
                let mut guard = engine.lock().await;
                let g = &mut *guard;
                if g.cycle_id != cycle_id || g.state != BingoState::Running {
                    return;
                }
                match g.pool.draw(&mut g.rng) {
                    Some(track) => (
                        g.resolver.clone(),
                        g.driver.clone(),
                        g.events.clone(),
                        track,
                    ),
                    None => {
                        info!("Bingo pool exhausted after {} plays", g.pool.history().len());
                        g.state = BingoState::Exhausted;
                        g.current = None;
                        g.events.emit(SessionEvent::BingoExhausted {
                            timestamp: Utc::now(),
                        });
                        return;
                    }
                }
            };

            // Prefer the structured preview the playlist fetch already
            // carried; fall back to the resolver.
            let url = match drawn.preview_url.clone() {
                Some(url) => Some(url),
                None => match resolve_with_retry(resolver.as_ref(), &drawn.id).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!("Bingo preview resolution failed for {}: {e}", drawn.id);
                        None
                    }
                },
            };

            let Some(url) = url else {
                let mut guard = engine.lock().await;
                debug!("No preview for {}, skipping", drawn.id);
                // The draw already happened; account for it even when the
                // cycle went stale mid-resolve.
                guard.pool.record_skipped();
                events.emit(SessionEvent::BingoTrackSkipped {
                    track_id: drawn.id.clone(),
                    timestamp: Utc::now(),
                });
                if guard.cycle_id != cycle_id || guard.state != BingoState::Running {
                    return;
                }
                continue;
            };

            match driver.play(&PlaybackSource::PreviewClip { url }).await {
                Ok(()) => {
                    let mut guard = engine.lock().await;
                    if guard.cycle_id != cycle_id || guard.state != BingoState::Running {
                        // Paused or torn down while the clip was fetching;
                        // the draw still has to be accounted for.
                        guard.pool.record_skipped();
                        let _ = driver.stop().await;
                        return;
                    }
                    guard.pool.record_played(drawn.clone());
                    guard.current = Some(drawn.clone());
                    guard.elapsed_secs = 0;
                    let round = cycle.child_token();
                    guard.round_token = round.clone();
                    events.emit(SessionEvent::BingoTrackStarted {
                        track: drawn,
                        played: guard.pool.history().len(),
                        remaining: guard.pool.remaining_len(),
                        timestamp: Utc::now(),
                    });
                    drop(guard);
                    Self::spawn_countdown(engine.clone(), cycle_id, cycle, round, 0);
                    return;
                }
                Err(e) => {
                    let mut guard = engine.lock().await;
                    warn!("Bingo playback failed for {}: {e}, skipping", drawn.id);
                    guard.pool.record_skipped();
                    events.emit(SessionEvent::BingoTrackSkipped {
                        track_id: drawn.id.clone(),
                        timestamp: Utc::now(),
                    });
                    if guard.cycle_id != cycle_id || guard.state != BingoState::Running {
                        return;
                    }
                    continue;
                }
            }
        }
    }

    /// Tick the fixed play window once per second, then close the round.
    fn spawn_countdown(
        engine: Arc<Mutex<Self>>,
        cycle_id: u64,
        cycle: CancellationToken,
        round: CancellationToken,
        from_secs: u64,
    ) {
        tokio::spawn(async move {
            let (total, gap_ms) = {
                let guard = engine.lock().await;
                (guard.countdown_secs, guard.gap_ms)
            };

            let mut elapsed = from_secs;
            while elapsed < total {
                tokio::select! {
                    _ = round.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                elapsed += 1;
                let mut guard = engine.lock().await;
                if guard.cycle_id != cycle_id || guard.state != BingoState::Running {
                    return;
                }
                guard.elapsed_secs = elapsed;
                guard.events.emit(SessionEvent::BingoProgress {
                    elapsed_secs: elapsed,
                    total_secs: total,
                    timestamp: Utc::now(),
                });
            }

            Self::finish_round(engine, cycle_id, cycle, gap_ms).await;
        });
    }

    /// Close the current window: stop audio, wait the fixed gap, draw the
    /// next track if the cycle is still live.
    async fn finish_round(
        engine: Arc<Mutex<Self>>,
        cycle_id: u64,
        cycle: CancellationToken,
        gap_ms: u64,
    ) {
        {
            let mut guard = engine.lock().await;
            if guard.cycle_id != cycle_id || guard.state != BingoState::Running {
                return;
            }
            guard.round_token.cancel();
            guard.current = None;
            guard.elapsed_secs = 0;
            let driver = guard.driver.clone();
            drop(guard);
            if let Err(e) = driver.stop().await {
                warn!("Bingo window stop: {e}");
            }
        }

        tokio::select! {
            _ = cycle.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(gap_ms)) => {}
        }

        {
            let guard = engine.lock().await;
            if guard.cycle_id != cycle_id || guard.state != BingoState::Running {
                return;
            }
        }
        Self::advance(engine, cycle_id, cycle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {id}"),
            artists: vec!["Artist".to_string()],
            duration_ms: 180_000,
            preview_url: None,
        }
    }

    #[test]
    fn draws_every_track_exactly_once() {
        let tracks: Vec<Track> = (0..20).map(|i| track(&i.to_string())).collect();
        let mut pool = BingoPool::new(tracks.clone());
        let mut rng = StdRng::seed_from_u64(7);

        let mut drawn = HashSet::new();
        for _ in 0..tracks.len() {
            let t = pool.draw(&mut rng).expect("pool not yet exhausted");
            assert!(drawn.insert(t.id.clone()), "repeated draw of {}", t.id);
            pool.record_played(t);
        }

        assert!(pool.is_exhausted());
        assert_eq!(pool.history().len(), tracks.len());
        let history_ids: HashSet<String> =
            pool.history().iter().map(|e| e.track.id.clone()).collect();
        assert_eq!(history_ids.len(), tracks.len());
    }

    #[test]
    fn draw_after_exhaustion_signals_exhausted() {
        let mut pool = BingoPool::new(vec![track("only")]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pool.draw(&mut rng).is_some());
        assert!(pool.draw(&mut rng).is_none());
        assert!(pool.draw(&mut rng).is_none());
    }

    #[test]
    fn skips_keep_the_pool_accounting_consistent() {
        let tracks: Vec<Track> = (0..5).map(|i| track(&i.to_string())).collect();
        let mut pool = BingoPool::new(tracks);
        let mut rng = StdRng::seed_from_u64(3);

        let first = pool.draw(&mut rng).unwrap();
        pool.record_played(first);
        let _second = pool.draw(&mut rng).unwrap();
        pool.record_skipped();

        assert_eq!(
            pool.history().len() + pool.remaining_len(),
            pool.total() - pool.skipped()
        );
    }

    #[test]
    fn duplicate_playlist_entries_collapse_to_one_draw() {
        let mut pool = BingoPool::new(vec![track("dup"), track("dup"), track("other")]);
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(pool.total(), 2);
        assert!(pool.draw(&mut rng).is_some());
        assert!(pool.draw(&mut rng).is_some());
        assert!(pool.draw(&mut rng).is_none());
    }

    #[test]
    fn empty_pool_is_exhausted_from_the_start() {
        let mut pool = BingoPool::new(Vec::new());
        let mut rng = StdRng::seed_from_u64(0);
        assert!(pool.is_exhausted());
        assert!(pool.draw(&mut rng).is_none());
    }
}
