//! Backend-agnostic playback driver
//!
//! `play` / `pause` / `resume` plus an observable `is_playing` flag over
//! two backends: remote full-track playback and a local preview element.
//! All playback commands funnel through the owning state machine or draw
//! engine; the driver itself is passive and guarantees a new `play` never
//! overlaps the previous one.

mod local;
mod remote;

pub use local::LocalPreviewBackend;
pub use remote::RemoteBackend;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use bss_common::types::PlaybackSource;

/// Playback failures. The caller's policy is "abandon this track, let the
/// user pick another"; the same source is never silently retried.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    /// Source kind not supported by this backend
    #[error("playback rejected: {0}")]
    Rejected(String),

    /// Local audio element failed (fetch, decode, device)
    #[error("audio element error: {0}")]
    Element(String),

    /// Remote command failed (transport or status)
    #[error("remote command failed: {0}")]
    Remote(String),
}

/// Events pushed up from a backend while a source plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Audio is audible
    Started,
    /// Natural end of the audio
    Ended,
    /// Playback aborted mid-stream
    Failed(String),
}

/// Port over a concrete audio backend.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start playing `source` from the beginning.
    async fn play(&self, source: &PlaybackSource) -> Result<(), PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    async fn resume(&self) -> Result<(), PlaybackError>;

    /// Stop and discard current playback. Idempotent; stopping an idle
    /// backend succeeds.
    async fn stop(&self) -> Result<(), PlaybackError>;
}

/// The backend-agnostic driver surface the state machines talk to.
pub struct PlaybackDriver {
    backend: Arc<dyn AudioBackend>,
    is_playing: Arc<watch::Sender<bool>>,
}

impl PlaybackDriver {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        let (is_playing, _) = watch::channel(false);
        Self {
            backend,
            is_playing: Arc::new(is_playing),
        }
    }

    /// Observable play/pause flag.
    pub fn is_playing(&self) -> watch::Receiver<bool> {
        self.is_playing.subscribe()
    }

    /// Sender half of the flag, for push-driven state mirrors (premium
    /// sessions update it from remote player state rather than from local
    /// command completion).
    pub fn is_playing_handle(&self) -> Arc<watch::Sender<bool>> {
        self.is_playing.clone()
    }

    /// Start `source`, stopping any prior playback first so audio streams
    /// never overlap.
    pub async fn play(&self, source: &PlaybackSource) -> Result<(), PlaybackError> {
        self.backend.stop().await?;
        self.backend.play(source).await?;
        let _ = self.is_playing.send(true);
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.backend.pause().await?;
        let _ = self.is_playing.send(false);
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        self.backend.resume().await?;
        let _ = self.is_playing.send(true);
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), PlaybackError> {
        self.backend.stop().await?;
        let _ = self.is_playing.send(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the command sequence a driver issues.
    struct RecordingBackend {
        log: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
            })
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AudioBackend for RecordingBackend {
        async fn play(&self, source: &PlaybackSource) -> Result<(), PlaybackError> {
            let label = match source {
                PlaybackSource::RemoteTrack { track_id } => format!("play remote {track_id}"),
                PlaybackSource::PreviewClip { url } => format!("play preview {url}"),
            };
            self.log.lock().unwrap().push(label);
            Ok(())
        }

        async fn pause(&self) -> Result<(), PlaybackError> {
            self.log.lock().unwrap().push("pause".into());
            Ok(())
        }

        async fn resume(&self) -> Result<(), PlaybackError> {
            self.log.lock().unwrap().push("resume".into());
            Ok(())
        }

        async fn stop(&self) -> Result<(), PlaybackError> {
            self.log.lock().unwrap().push("stop".into());
            Ok(())
        }
    }

    #[tokio::test]
    async fn play_always_stops_previous_playback_first() {
        let backend = RecordingBackend::new();
        let driver = PlaybackDriver::new(backend.clone());

        driver
            .play(&PlaybackSource::PreviewClip { url: "a".into() })
            .await
            .unwrap();
        driver
            .play(&PlaybackSource::PreviewClip { url: "b".into() })
            .await
            .unwrap();

        assert_eq!(
            backend.log(),
            vec!["stop", "play preview a", "stop", "play preview b"]
        );
    }

    #[tokio::test]
    async fn is_playing_tracks_commands() {
        let backend = RecordingBackend::new();
        let driver = PlaybackDriver::new(backend);
        let flag = driver.is_playing();

        assert!(!*flag.borrow());
        driver
            .play(&PlaybackSource::PreviewClip { url: "a".into() })
            .await
            .unwrap();
        assert!(*flag.borrow());
        driver.pause().await.unwrap();
        assert!(!*flag.borrow());
        driver.resume().await.unwrap();
        assert!(*flag.borrow());
        driver.stop().await.unwrap();
        assert!(!*flag.borrow());
    }
}
