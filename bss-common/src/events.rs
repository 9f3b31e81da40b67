//! Event types for the BSS event system
//!
//! Provides the shared phase/event definitions and the EventBus that the
//! session orchestrator broadcasts on. Events are serializable for SSE
//! transmission; all observers (SSE clients, tests) subscribe through the
//! bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{AccountCapability, GameMode, Track};

/// Buffer size of the broadcast channel behind [`EventBus`].
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Single-track game phase.
///
/// One discriminated value per state machine; the illegal combinations the
/// original grab-bag of boolean view flags allowed are unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Round not started
    Idle,
    /// Waiting for a decoded QR payload
    Scanning,
    /// Track link accepted, capability branch not taken yet
    Scanned,
    /// Preview resolved; waiting for user confirmation (and the
    /// orientation permission grant) before arming the flip gate
    ReadyToFlip,
    /// Flip gate armed; audio withheld until the device is face-down
    WaitingForFlip,
    /// Local preview clip playing
    PreviewPlaying,
    /// Full track playing on the remote device
    RemotePlaying,
    /// Round finished; leaves only via explicit "next" or "reset"
    Done,
    /// Recovered failure; leaves only via explicit user action
    Error { kind: SessionErrorKind },
}

impl Phase {
    /// Whether audio is currently being driven by this phase.
    pub fn is_playing(&self) -> bool {
        matches!(self, Phase::PreviewPlaying | Phase::RemotePlaying)
    }
}

/// User-facing failure classes.
///
/// Every component failure is recovered at its boundary and converted into
/// one of these; no raw transport error reaches a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// Decoded payload is not a recognized track or playlist link
    ScanFormat,
    /// Preview or playlist fetch failed (network/HTTP); retryable
    Resolution,
    /// Playback could not start or aborted; pick another track
    Playback,
    /// Orientation access denied; the flip-gated flow cannot run
    Permission,
}

/// BSS event types
///
/// Broadcast via [`EventBus`] and serialized for SSE transmission. All
/// variants carry the wall-clock time they were emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Capability probe settled (exactly once per session)
    CapabilityResolved {
        capability: AccountCapability,
        timestamp: DateTime<Utc>,
    },

    /// App-level mode changed (Select / Single / Bingo)
    ModeChanged {
        mode: GameMode,
        timestamp: DateTime<Utc>,
    },

    /// Single-track phase transition
    PhaseChanged {
        old_phase: Phase,
        new_phase: Phase,
        timestamp: DateTime<Utc>,
    },

    /// A scanned payload was accepted as a track link
    TrackScanned {
        track_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Preview resolution finished for a track
    ///
    /// `found: false` is the legitimate "no preview available" outcome,
    /// distinct from a resolution failure (which surfaces as an Error
    /// phase, not an event of this kind).
    PreviewResolved {
        track_id: String,
        found: bool,
        timestamp: DateTime<Utc>,
    },

    /// The device was judged face-down and the reveal latch fired
    FlipDetected { timestamp: DateTime<Utc> },

    /// Playback started on one of the two backends
    PlaybackStarted {
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// Playback finished
    ///
    /// `natural` is false when the duration-ceiling guard ended the round
    /// because the backend never reported "ended".
    PlaybackEnded {
        natural: bool,
        timestamp: DateTime<Utc>,
    },

    /// Playback failed to start or aborted mid-round
    PlaybackFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A bingo draw started playing
    BingoTrackStarted {
        track: Track,
        played: usize,
        remaining: usize,
        timestamp: DateTime<Utc>,
    },

    /// A drawn track had no resolvable preview and was skipped
    BingoTrackSkipped {
        track_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Per-second countdown tick during a bingo play window
    BingoProgress {
        elapsed_secs: u64,
        total_secs: u64,
        timestamp: DateTime<Utc>,
    },

    /// Bingo running state toggled (pause/resume)
    BingoStateChanged {
        running: bool,
        timestamp: DateTime<Utc>,
    },

    /// Every track in the pool has been drawn; terminal for the round
    BingoExhausted { timestamp: DateTime<Utc> },
}

/// Broadcast bus for [`SessionEvent`]
///
/// Cheap to clone; send errors are ignored because running with no
/// subscribers is a valid state.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Broadcast an event to all subscribers.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
