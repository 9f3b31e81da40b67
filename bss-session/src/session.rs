//! Single-track game loop
//!
//! One `Phase` value plus explicit transition functions. The free path
//! chains preview resolution and the flip gate so audio never starts
//! before the device is confirmed face-down; the premium path commands the
//! remote player directly. `Error` and `Done` leave only via explicit user
//! actions, never automatically.

use std::sync::Arc;
use chrono::Utc;
use tracing::{info, warn};

use bss_common::events::{EventBus, Phase, SessionErrorKind, SessionEvent};
use bss_common::links::{classify, ScanTarget};
use bss_common::types::{AccountCapability, PlaybackSource};

use crate::gate::OrientationPermission;
use crate::playback::PlaybackDriver;
use crate::resolver::{resolve_with_retry, PreviewSource};
use crate::{Error, Result};

/// Per-round state owned by the machine; discarded on every reset and on
/// every `Scanning` re-entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSession {
    /// Raw scanned URL as decoded from the QR code
    pub scanned_track_ref: Option<String>,
    /// Preview clip URL the resolver produced (free path only)
    pub resolved_preview_url: Option<String>,
}

/// The single-track state machine.
///
/// All playback commands funnel through here; at most one of
/// {RemotePlaying, PreviewPlaying} is ever active, and entering either
/// first clears any stale playback from a prior round.
pub struct SessionStateMachine {
    phase: Phase,
    session: PlaybackSession,
    capability: AccountCapability,
    resolver: Arc<dyn PreviewSource>,
    remote: Option<Arc<PlaybackDriver>>,
    local: Arc<PlaybackDriver>,
    events: EventBus,
}

impl SessionStateMachine {
    pub fn new(
        capability: AccountCapability,
        resolver: Arc<dyn PreviewSource>,
        remote: Option<Arc<PlaybackDriver>>,
        local: Arc<PlaybackDriver>,
        events: EventBus,
    ) -> Self {
        Self {
            phase: Phase::Idle,
            session: PlaybackSession::default(),
            capability,
            resolver,
            remote,
            local,
            events,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn capability(&self) -> &AccountCapability {
        &self.capability
    }

    /// User requested a scan (or a retry after `Error`/`Done`).
    ///
    /// Clears all round state so nothing leaks into the new round.
    pub async fn begin_scan(&mut self) -> Result<()> {
        match self.phase {
            Phase::Idle | Phase::Done | Phase::Error { .. } => {
                self.stop_playback().await;
                self.session = PlaybackSession::default();
                self.set_phase(Phase::Scanning);
                Ok(())
            }
            Phase::Scanning => Ok(()),
            _ => Err(Error::InvalidState(format!(
                "cannot start scanning from {:?}",
                self.phase
            ))),
        }
    }

    /// A decoded QR payload arrived while scanning.
    pub async fn on_scan(&mut self, payload: &str) -> Result<()> {
        if self.phase != Phase::Scanning {
            return Err(Error::InvalidState(format!(
                "scan result outside Scanning ({:?})",
                self.phase
            )));
        }

        let Some(ScanTarget::Track(track_id)) = classify(payload) else {
            warn!("Scanned payload is not a track link");
            self.set_phase(Phase::Error {
                kind: SessionErrorKind::ScanFormat,
            });
            return Ok(());
        };

        self.session.scanned_track_ref = Some(payload.to_string());
        self.set_phase(Phase::Scanned);
        self.events.emit(SessionEvent::TrackScanned {
            track_id: track_id.clone(),
            timestamp: Utc::now(),
        });

        if self.capability.is_premium() {
            self.start_remote(&track_id).await
        } else {
            self.resolve_preview(&track_id).await
        }
    }

    /// Premium branch: command the remote player directly, no flip gate.
    async fn start_remote(&mut self, track_id: &str) -> Result<()> {
        let Some(driver) = self.remote.clone() else {
            warn!("Premium session without a remote driver");
            self.set_phase(Phase::Error {
                kind: SessionErrorKind::Playback,
            });
            return Ok(());
        };

        let source = PlaybackSource::RemoteTrack {
            track_id: track_id.to_string(),
        };
        match driver.play(&source).await {
            Ok(()) => {
                self.events.emit(SessionEvent::PlaybackStarted {
                    source: "remote".to_string(),
                    timestamp: Utc::now(),
                });
                self.set_phase(Phase::RemotePlaying);
            }
            Err(e) => {
                warn!("Remote playback failed: {e}");
                self.events.emit(SessionEvent::PlaybackFailed {
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.set_phase(Phase::Error {
                    kind: SessionErrorKind::Playback,
                });
            }
        }
        Ok(())
    }

    /// Free branch: resolve a preview, then wait for the flip.
    async fn resolve_preview(&mut self, track_id: &str) -> Result<()> {
        match resolve_with_retry(self.resolver.as_ref(), track_id).await {
            Ok(Some(url)) => {
                self.session.resolved_preview_url = Some(url);
                self.events.emit(SessionEvent::PreviewResolved {
                    track_id: track_id.to_string(),
                    found: true,
                    timestamp: Utc::now(),
                });
                self.set_phase(Phase::ReadyToFlip);
            }
            Ok(None) => {
                // Normal branch, not an error: no preview for this track,
                // prompt for another scan.
                info!("No preview for {track_id}, back to scanning");
                self.events.emit(SessionEvent::PreviewResolved {
                    track_id: track_id.to_string(),
                    found: false,
                    timestamp: Utc::now(),
                });
                self.session = PlaybackSession::default();
                self.set_phase(Phase::Scanning);
            }
            Err(e) => {
                warn!("Preview resolution failed twice: {e}");
                self.set_phase(Phase::Error {
                    kind: SessionErrorKind::Resolution,
                });
            }
        }
        Ok(())
    }

    /// User confirmed the "get ready" prompt.
    ///
    /// The orientation grant must be settled by now: a denied grant blocks
    /// the flip-gated flow with an explanation instead of arming a gate
    /// that can never fire.
    pub fn confirm_ready(&mut self, permission: OrientationPermission) -> Result<()> {
        if self.phase != Phase::ReadyToFlip {
            return Err(Error::InvalidState(format!(
                "ready confirmation outside ReadyToFlip ({:?})",
                self.phase
            )));
        }
        match permission {
            OrientationPermission::Granted => {
                self.set_phase(Phase::WaitingForFlip);
            }
            OrientationPermission::Denied => {
                warn!("Orientation permission denied; cannot gate the reveal");
                self.set_phase(Phase::Error {
                    kind: SessionErrorKind::Permission,
                });
            }
        }
        Ok(())
    }

    /// The flip gate fired: start the withheld preview.
    pub async fn on_flipped(&mut self) -> Result<()> {
        if self.phase != Phase::WaitingForFlip {
            // A cancelled or stale gate signal; nothing to reveal.
            return Ok(());
        }
        self.events.emit(SessionEvent::FlipDetected {
            timestamp: Utc::now(),
        });

        let Some(url) = self.session.resolved_preview_url.clone() else {
            warn!("Flip fired without a resolved preview");
            self.set_phase(Phase::Error {
                kind: SessionErrorKind::Playback,
            });
            return Ok(());
        };

        match self.local.play(&PlaybackSource::PreviewClip { url }).await {
            Ok(()) => {
                self.events.emit(SessionEvent::PlaybackStarted {
                    source: "preview".to_string(),
                    timestamp: Utc::now(),
                });
                self.set_phase(Phase::PreviewPlaying);
            }
            Err(e) => {
                warn!("Preview playback failed: {e}");
                self.events.emit(SessionEvent::PlaybackFailed {
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.set_phase(Phase::Error {
                    kind: SessionErrorKind::Playback,
                });
            }
        }
        Ok(())
    }

    /// Natural "ended" event, or the duration-ceiling guard when the
    /// backend cannot reliably report one.
    pub async fn on_playback_ended(&mut self, natural: bool) -> Result<()> {
        if !self.phase.is_playing() {
            // Stale event from a round that was already torn down.
            return Ok(());
        }
        self.stop_playback().await;
        self.events.emit(SessionEvent::PlaybackEnded {
            natural,
            timestamp: Utc::now(),
        });
        self.set_phase(Phase::Done);
        Ok(())
    }

    /// Playback aborted mid-round (decode error, device loss).
    pub async fn on_playback_failed(&mut self, reason: &str) -> Result<()> {
        if !self.phase.is_playing() {
            return Ok(());
        }
        self.stop_playback().await;
        self.events.emit(SessionEvent::PlaybackFailed {
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        self.set_phase(Phase::Error {
            kind: SessionErrorKind::Playback,
        });
        Ok(())
    }

    /// Pause the active round (premium round controls, mostly).
    pub async fn pause(&mut self) -> Result<()> {
        if !self.phase.is_playing() {
            return Err(Error::InvalidState("nothing playing".into()));
        }
        self.active_driver()
            .pause()
            .await
            .map_err(|e| Error::Playback(e.to_string()))
    }

    pub async fn resume(&mut self) -> Result<()> {
        if !self.phase.is_playing() {
            return Err(Error::InvalidState("nothing playing".into()));
        }
        self.active_driver()
            .resume()
            .await
            .map_err(|e| Error::Playback(e.to_string()))
    }

    /// "Next" from `Done`: straight back to scanning, round state cleared.
    pub async fn next_round(&mut self) -> Result<()> {
        if self.phase != Phase::Done {
            return Err(Error::InvalidState(format!(
                "next outside Done ({:?})",
                self.phase
            )));
        }
        self.session = PlaybackSession::default();
        self.set_phase(Phase::Scanning);
        Ok(())
    }

    /// Full reset to `Idle`; stops any active playback.
    pub async fn reset(&mut self) {
        self.stop_playback().await;
        self.session = PlaybackSession::default();
        self.set_phase(Phase::Idle);
    }

    fn active_driver(&self) -> Arc<PlaybackDriver> {
        match (&self.phase, &self.remote) {
            (Phase::RemotePlaying, Some(remote)) => remote.clone(),
            _ => self.local.clone(),
        }
    }

    /// Stop both backends; errors are logged, not propagated, because a
    /// reset must always succeed.
    async fn stop_playback(&mut self) {
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.stop().await {
                warn!("Remote stop during reset: {e}");
            }
        }
        if let Err(e) = self.local.stop().await {
            warn!("Local stop during reset: {e}");
        }
    }

    fn set_phase(&mut self, new_phase: Phase) {
        if new_phase == self.phase {
            return;
        }
        let old_phase = std::mem::replace(&mut self.phase, new_phase.clone());
        info!("Phase {old_phase:?} -> {new_phase:?}");
        self.events.emit(SessionEvent::PhaseChanged {
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });
    }
}
