//! Core domain types shared across BSS crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single playable track as returned by a resolver.
///
/// Tracks are immutable value objects: created from resolver responses,
/// replaced rather than mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Vendor track identifier (path segment after `/track/`)
    pub id: String,
    /// Track title
    pub title: String,
    /// Ordered artist names
    pub artists: Vec<String>,
    /// Track duration in milliseconds
    pub duration_ms: u64,
    /// Short-preview clip URL, when the metadata source carries one
    pub preview_url: Option<String>,
}

impl Track {
    /// Comma-joined artist credit for display and history entries.
    pub fn artist_credit(&self) -> String {
        self.artists.join(", ")
    }
}

/// Account tier, resolved once per session by the capability probe.
///
/// `Premium` and `Free` are mutually exclusive and stable for the life of
/// the session; a new login is required to re-resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum AccountCapability {
    /// Probe has not settled yet
    Unknown,
    /// Full-track remote playback through the given device handle
    Premium {
        /// Opaque remote-player handle for device-scoped playback commands
        device_id: String,
    },
    /// Preview-only playback
    Free,
}

impl AccountCapability {
    pub fn is_premium(&self) -> bool {
        matches!(self, Self::Premium { .. })
    }
}

/// App-level mode above the two game engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Mode selection screen; "reset" always returns here
    Select,
    /// Single-track scan-and-guess rounds
    Single,
    /// Playlist-wide random-draw rounds
    Bingo,
}

/// One entry in the bingo play history, ordered by play time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayedEntry {
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

/// What the playback driver is asked to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackSource {
    /// Full track on the remote device
    RemoteTrack { track_id: String },
    /// Short preview clip fetched from the given URL
    PreviewClip { url: String },
}
