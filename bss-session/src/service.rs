//! Session service: the single owner of all game state
//!
//! Wires capability detection, the state machine, the bingo engine, the
//! flip gate, and the playback backends together, and funnels every
//! control-surface action into the right engine. Spawned callbacks (flip
//! signal, duration ceilings, backend events) re-enter through a weak
//! handle and are torn down on every reset.

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bss_common::config::Config;
use bss_common::events::{EventBus, Phase, SessionEvent};
use bss_common::links::{classify, ScanTarget};
use bss_common::types::{AccountCapability, GameMode, PlayedEntry};

use crate::bingo::{BingoDrawEngine, BingoStatus};
use crate::capability::{self, CapabilityDetector, VendorProbe};
use crate::gate::{FlipGate, FlipSubscription, OrientationPermission, OrientationSample};
use crate::playback::{BackendEvent, LocalPreviewBackend, PlaybackDriver, RemoteBackend};
use crate::resolver::{PlaylistResolver, PreviewResolver, PreviewSource};
use crate::session::SessionStateMachine;
use crate::{Error, Result};

/// Outcome of a scan submission, for the control surface.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Single mode: the round advanced to this phase
    Single { phase: Phase },
    /// Bingo mode: pool loaded with this many playable candidates
    BingoLoaded { total: usize },
    /// Bingo mode: playlist had no usable tracks; pick another
    EmptyPlaylist,
}

/// Snapshot of everything a client needs to render.
#[derive(Debug, Serialize)]
pub struct StateSnapshot {
    pub mode: GameMode,
    pub capability: AccountCapability,
    pub phase: Phase,
    pub bingo: Option<BingoStatus>,
}

struct ServiceState {
    mode: GameMode,
    machine: SessionStateMachine,
    bingo: Option<Arc<Mutex<BingoDrawEngine>>>,
    /// Sample feed of the armed flip gate, if one is live
    orientation_tx: Option<mpsc::Sender<OrientationSample>>,
    flip_sub: Option<FlipSubscription>,
    /// Cancels the duration-ceiling guard of the active round
    ceiling: Option<CancellationToken>,
}

/// The session orchestrator service.
pub struct SessionService {
    config: Config,
    events: EventBus,
    gate: FlipGate,
    resolver: Arc<dyn PreviewSource>,
    playlist_resolver: PlaylistResolver,
    local_driver: Arc<PlaybackDriver>,
    inner: Mutex<ServiceState>,
    /// Handle for spawned callbacks to re-enter without keeping the
    /// service alive past shutdown.
    weak: Weak<SessionService>,
}

impl SessionService {
    /// Build and wire the whole orchestrator: spawn the audio thread,
    /// resolve the account capability, and start the backend event pump.
    pub async fn start(config: Config) -> Result<Arc<Self>> {
        let events = EventBus::new();

        let (local_backend, backend_rx) = LocalPreviewBackend::spawn()?;
        let local_driver = Arc::new(PlaybackDriver::new(Arc::new(local_backend)));

        let probe = VendorProbe::new(&config.api_base_url, &config.access_token)?;
        let capability = CapabilityDetector::new(probe).detect(&events).await;

        let mut remote_driver = None;
        if let AccountCapability::Premium { device_id } = &capability {
            let backend = RemoteBackend::new(&config.api_base_url, &config.access_token, device_id)?;
            if let Err(e) = backend.set_volume(config.remote_volume).await {
                warn!("Initial remote volume: {e}");
            }
            let driver = Arc::new(PlaybackDriver::new(Arc::new(backend)));
            // Persistent state mirror for the life of the premium session.
            capability::spawn_state_mirror(
                config.api_base_url.clone(),
                config.access_token.clone(),
                Duration::from_secs(config.state_poll_secs),
                driver.is_playing_handle(),
            );
            remote_driver = Some(driver);
        }

        let resolver: Arc<dyn PreviewSource> = Arc::new(
            PreviewResolver::new(&config).map_err(|e| Error::Resolution(e.to_string()))?,
        );
        let playlist_resolver =
            PlaylistResolver::new(&config).map_err(|e| Error::Resolution(e.to_string()))?;

        let machine = SessionStateMachine::new(
            capability,
            resolver.clone(),
            remote_driver,
            local_driver.clone(),
            events.clone(),
        );

        let service = Arc::new_cyclic(|weak| Self {
            gate: FlipGate::new(config.flip_threshold_degrees),
            config,
            events,
            resolver,
            playlist_resolver,
            local_driver,
            inner: Mutex::new(ServiceState {
                mode: GameMode::Select,
                machine,
                bingo: None,
                orientation_tx: None,
                flip_sub: None,
                ceiling: None,
            }),
            weak: weak.clone(),
        });
        service.spawn_backend_pump(backend_rx);
        Ok(service)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn state(&self) -> StateSnapshot {
        let st = self.inner.lock().await;
        let bingo = match &st.bingo {
            Some(engine) => Some(engine.lock().await.status()),
            None => None,
        };
        StateSnapshot {
            mode: st.mode,
            capability: st.machine.capability().clone(),
            phase: st.machine.phase().clone(),
            bingo,
        }
    }

    /// Switch the app-level mode, tearing down whatever was running.
    pub async fn set_mode(&self, mode: GameMode) -> Result<()> {
        self.teardown_round().await;
        let mut st = self.inner.lock().await;
        st.mode = mode;
        info!("Mode -> {mode:?}");
        self.events.emit(SessionEvent::ModeChanged {
            mode,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// A decoded QR payload arrived.
    pub async fn scan(&self, payload: &str) -> Result<ScanOutcome> {
        let mode = self.inner.lock().await.mode;
        match mode {
            GameMode::Select => Err(Error::InvalidState("pick a mode first".into())),
            GameMode::Single => self.scan_single(payload).await,
            GameMode::Bingo => self.scan_playlist(payload).await,
        }
    }

    async fn scan_single(&self, payload: &str) -> Result<ScanOutcome> {
        let phase = {
            let mut st = self.inner.lock().await;
            st.machine.begin_scan().await?;
            st.machine.on_scan(payload).await?;
            st.machine.phase().clone()
        };
        if phase.is_playing() {
            self.arm_ceiling(&phase).await;
        }
        Ok(ScanOutcome::Single { phase })
    }

    async fn scan_playlist(&self, payload: &str) -> Result<ScanOutcome> {
        {
            let st = self.inner.lock().await;
            if st.bingo.is_some() {
                return Err(Error::InvalidState(
                    "playlist already loaded; back out first".into(),
                ));
            }
        }
        let Some(ScanTarget::Playlist(playlist_id)) = classify(payload) else {
            return Err(Error::ScanFormat(payload.to_string()));
        };

        let tracks = self
            .playlist_resolver
            .fetch_tracks(&playlist_id)
            .await
            .map_err(|e| Error::Resolution(e.to_string()))?;
        if tracks.is_empty() {
            // Defined outcome, not an error: guide the user to another
            // playlist.
            return Ok(ScanOutcome::EmptyPlaylist);
        }

        let total = tracks.len();
        let engine = BingoDrawEngine::new(
            tracks,
            self.resolver.clone(),
            self.local_driver.clone(),
            self.events.clone(),
            self.config.bingo_countdown_secs,
            self.config.bingo_gap_ms,
        );
        let mut st = self.inner.lock().await;
        st.bingo = Some(Arc::new(Mutex::new(engine)));
        Ok(ScanOutcome::BingoLoaded { total })
    }

    /// User confirmed the "get ready" prompt, with the orientation grant
    /// already settled. Arms a fresh flip gate on success.
    pub async fn confirm_ready(&self, orientation_granted: bool) -> Result<()> {
        let permission = if orientation_granted {
            OrientationPermission::Granted
        } else {
            OrientationPermission::Denied
        };

        let mut st = self.inner.lock().await;
        st.machine.confirm_ready(permission)?;
        if permission == OrientationPermission::Denied {
            // The machine is now in the permission error state; tell the
            // caller why instead of silently waiting for a flip that can
            // never be observed.
            return Err(Error::PermissionDenied);
        }
        if *st.machine.phase() != Phase::WaitingForFlip {
            return Ok(());
        }

        // Fresh latch per reveal cycle.
        if let Some(old) = st.flip_sub.take() {
            old.cancel();
        }
        let (sample_tx, sample_rx) = mpsc::channel(32);
        let (sub, fired) = self.gate.arm(sample_rx);
        st.orientation_tx = Some(sample_tx);
        st.flip_sub = Some(sub);
        drop(st);

        self.spawn_flip_waiter(fired);
        Ok(())
    }

    /// One orientation sample from the device. Samples arriving while no
    /// gate is armed are dropped.
    pub async fn orientation(&self, beta: f64) -> Result<()> {
        let tx = self.inner.lock().await.orientation_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(OrientationSample { beta }).await;
        }
        Ok(())
    }

    /// "Next" from `Done`: straight back to scanning.
    pub async fn next(&self) -> Result<()> {
        let mut st = self.inner.lock().await;
        st.machine.next_round().await
    }

    /// Full reset: stop everything and return to mode selection.
    pub async fn reset(&self) -> Result<()> {
        self.teardown_round().await;
        let mut st = self.inner.lock().await;
        st.mode = GameMode::Select;
        self.events.emit(SessionEvent::ModeChanged {
            mode: GameMode::Select,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn playback_pause(&self) -> Result<()> {
        let mut st = self.inner.lock().await;
        st.machine.pause().await
    }

    pub async fn playback_resume(&self) -> Result<()> {
        let mut st = self.inner.lock().await;
        st.machine.resume().await
    }

    pub async fn bingo_resume(&self) -> Result<()> {
        let engine = self.bingo_engine().await?;
        BingoDrawEngine::resume(&engine).await
    }

    pub async fn bingo_pause(&self) -> Result<()> {
        let engine = self.bingo_engine().await?;
        let mut engine = engine.lock().await;
        engine.pause().await
    }

    /// "Back to playlist selection": discard the pool entirely.
    pub async fn bingo_back(&self) -> Result<()> {
        let engine = self.inner.lock().await.bingo.take();
        match engine {
            Some(engine) => {
                engine.lock().await.shutdown().await;
                Ok(())
            }
            None => Err(Error::InvalidState("no bingo pool loaded".into())),
        }
    }

    pub async fn bingo_history(&self) -> Result<Vec<PlayedEntry>> {
        let engine = self.bingo_engine().await?;
        let engine = engine.lock().await;
        Ok(engine.history().to_vec())
    }

    async fn bingo_engine(&self) -> Result<Arc<Mutex<BingoDrawEngine>>> {
        self.inner
            .lock()
            .await
            .bingo
            .clone()
            .ok_or_else(|| Error::InvalidState("no bingo pool loaded".into()))
    }

    /// Wait for the armed gate to fire, then reveal.
    fn spawn_flip_waiter(&self, fired: oneshot::Receiver<()>) {
        let weak = self.weak.clone();
        tokio::spawn(async move {
            if fired.await.is_ok() {
                if let Some(service) = weak.upgrade() {
                    service.handle_flip().await;
                }
            }
        });
    }

    /// The armed gate fired: reveal the audio, then guard the round with
    /// the preview ceiling.
    async fn handle_flip(&self) {
        let phase = {
            let mut st = self.inner.lock().await;
            // Latch used up; a fresh arm is required for the next cycle.
            st.orientation_tx = None;
            st.flip_sub = None;
            if let Err(e) = st.machine.on_flipped().await {
                warn!("Flip handling: {e}");
            }
            st.machine.phase().clone()
        };
        if phase.is_playing() {
            self.arm_ceiling(&phase).await;
        }
    }

    /// Guard a playing round with a duration ceiling for backends that
    /// cannot reliably report "ended".
    async fn arm_ceiling(&self, phase: &Phase) {
        let secs = match phase {
            Phase::PreviewPlaying => self.config.preview_ceiling_secs,
            Phase::RemotePlaying => self.config.remote_ceiling_secs,
            _ => return,
        };

        let token = CancellationToken::new();
        {
            let mut st = self.inner.lock().await;
            if let Some(old) = st.ceiling.replace(token.clone()) {
                old.cancel();
            }
        }

        let weak = self.weak.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    debug!("Playback ceiling reached after {secs}s");
                    if let Some(service) = weak.upgrade() {
                        service.handle_playback_ended(false).await;
                    }
                }
            }
        });
    }

    async fn handle_playback_ended(&self, natural: bool) {
        let mut st = self.inner.lock().await;
        if let Some(token) = st.ceiling.take() {
            token.cancel();
        }
        if let Err(e) = st.machine.on_playback_ended(natural).await {
            warn!("Playback end handling: {e}");
        }
    }

    /// Route local backend events to whichever engine owns the audio.
    fn spawn_backend_pump(&self, mut rx: mpsc::UnboundedReceiver<BackendEvent>) {
        let weak = self.weak.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(service) = weak.upgrade() else { break };
                match event {
                    BackendEvent::Started => {}
                    BackendEvent::Ended => service.handle_local_ended().await,
                    BackendEvent::Failed(reason) => service.handle_local_failed(&reason).await,
                }
            }
        });
    }

    async fn handle_local_ended(&self) {
        let (mode, bingo) = {
            let st = self.inner.lock().await;
            (st.mode, st.bingo.clone())
        };
        match (mode, bingo) {
            (GameMode::Bingo, Some(engine)) => BingoDrawEngine::on_track_ended(&engine).await,
            _ => self.handle_playback_ended(true).await,
        }
    }

    async fn handle_local_failed(&self, reason: &str) {
        let (mode, bingo) = {
            let st = self.inner.lock().await;
            (st.mode, st.bingo.clone())
        };
        match (mode, bingo) {
            // A bingo track that dies mid-clip just yields to the next
            // draw.
            (GameMode::Bingo, Some(engine)) => BingoDrawEngine::on_track_ended(&engine).await,
            _ => {
                let mut st = self.inner.lock().await;
                if let Some(token) = st.ceiling.take() {
                    token.cancel();
                }
                if let Err(e) = st.machine.on_playback_failed(reason).await {
                    warn!("Playback failure handling: {e}");
                }
            }
        }
    }

    /// Stop playback, cancel guards, discard the bingo pool, reset the
    /// machine.
    async fn teardown_round(&self) {
        let bingo = {
            let mut st = self.inner.lock().await;
            if let Some(token) = st.ceiling.take() {
                token.cancel();
            }
            if let Some(sub) = st.flip_sub.take() {
                sub.cancel();
            }
            st.orientation_tx = None;
            st.bingo.take()
        };
        if let Some(engine) = bingo {
            engine.lock().await.shutdown().await;
        }
        let mut st = self.inner.lock().await;
        st.machine.reset().await;
    }
}
