//! Shared fakes for the end-to-end tests: an in-memory preview source and
//! a recording audio backend.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use bss_common::types::PlaybackSource;
use bss_session::playback::{AudioBackend, PlaybackError};
use bss_session::resolver::{PreviewSource, ResolveError};

/// Preview source over a fixed table; counts lookups so tests can assert
/// the premium path never resolves at all.
pub struct TablePreviewSource {
    entries: HashMap<String, Option<String>>,
    calls: AtomicUsize,
}

impl TablePreviewSource {
    pub fn new(entries: &[(&str, Option<&str>)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreviewSource for TablePreviewSource {
    async fn resolve(&self, track_id: &str) -> Result<Option<String>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.get(track_id).cloned().flatten())
    }
}

/// Preview source that always fails resolution.
pub struct FailingPreviewSource;

#[async_trait]
impl PreviewSource for FailingPreviewSource {
    async fn resolve(&self, _track_id: &str) -> Result<Option<String>, ResolveError> {
        Err(ResolveError::Status(500))
    }
}

/// Backend that records the command sequence; `fail_next_play` makes the
/// next play reject, modelling an autoplay block or decode error.
#[derive(Default)]
pub struct RecordingBackend {
    log: Mutex<Vec<String>>,
    fail_next_play: AtomicBool,
}

impl RecordingBackend {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn fail_next_play(&self) {
        self.fail_next_play.store(true, Ordering::SeqCst);
    }

    pub fn plays(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|entry| entry.starts_with("play"))
            .collect()
    }
}

#[async_trait]
impl AudioBackend for RecordingBackend {
    async fn play(&self, source: &PlaybackSource) -> Result<(), PlaybackError> {
        if self.fail_next_play.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::Element("decode error".into()));
        }
        let entry = match source {
            PlaybackSource::RemoteTrack { track_id } => format!("play remote {track_id}"),
            PlaybackSource::PreviewClip { url } => format!("play preview {url}"),
        };
        self.log.lock().unwrap().push(entry);
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
