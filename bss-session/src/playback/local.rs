//! Local preview backend
//!
//! Plays short preview clips through a rodio sink. The output stream is
//! not `Send`, so it lives on a dedicated audio thread driven by a command
//! channel; start/end/failure flow back on an event channel the service
//! pumps into the owning engine. A fresh sink per play guarantees no
//! overlapping audio.

use async_trait::async_trait;
use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{AudioBackend, BackendEvent, PlaybackError};
use bss_common::types::PlaybackSource;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Poll interval for end-of-clip detection on the audio thread.
const SINK_POLL_INTERVAL: Duration = Duration::from_millis(200);

enum LocalCommand {
    Play(Vec<u8>),
    Pause,
    Resume,
    Stop,
}

/// Local audio element over a dedicated rodio thread.
pub struct LocalPreviewBackend {
    http: reqwest::Client,
    commands: std_mpsc::Sender<LocalCommand>,
}

impl LocalPreviewBackend {
    /// Spawn the audio thread and return the backend plus the receiver of
    /// its playback events. The thread lives until the backend is dropped.
    pub fn spawn() -> crate::Result<(Self, mpsc::UnboundedReceiver<BackendEvent>)> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| crate::Error::Internal(format!("http client: {e}")))?;

        let (command_tx, command_rx) = std_mpsc::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("bss-audio".into())
            .spawn(move || audio_thread(command_rx, event_tx))?;

        Ok((
            Self {
                http,
                commands: command_tx,
            },
            event_rx,
        ))
    }

    fn send(&self, command: LocalCommand) -> Result<(), PlaybackError> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::Element("audio thread gone".into()))
    }
}

#[async_trait]
impl AudioBackend for LocalPreviewBackend {
    async fn play(&self, source: &PlaybackSource) -> Result<(), PlaybackError> {
        let PlaybackSource::PreviewClip { url } = source else {
            return Err(PlaybackError::Rejected(
                "local backend plays preview clips only".into(),
            ));
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PlaybackError::Element(format!("clip fetch: {e}")))?;
        if !response.status().is_success() {
            return Err(PlaybackError::Element(format!(
                "clip fetch returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Element(format!("clip body: {e}")))?
            .to_vec();

        debug!("Fetched preview clip ({} bytes)", bytes.len());
        self.send(LocalCommand::Play(bytes))
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.send(LocalCommand::Pause)
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        self.send(LocalCommand::Resume)
    }

    async fn stop(&self) -> Result<(), PlaybackError> {
        self.send(LocalCommand::Stop)
    }
}

/// The audio thread: owns the output stream, reacts to commands, and
/// watches the sink drain to report natural clip end.
fn audio_thread(
    commands: std_mpsc::Receiver<LocalCommand>,
    events: mpsc::UnboundedSender<BackendEvent>,
) {
    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            warn!("No audio output device: {e}");
            let _ = events.send(BackendEvent::Failed(format!("no audio output: {e}")));
            return;
        }
    };

    let mut sink: Option<rodio::Sink> = None;

    loop {
        match commands.recv_timeout(SINK_POLL_INTERVAL) {
            Ok(LocalCommand::Play(bytes)) => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
                match start_clip(&handle, bytes) {
                    Ok(new_sink) => {
                        sink = Some(new_sink);
                        let _ = events.send(BackendEvent::Started);
                    }
                    Err(reason) => {
                        warn!("Preview clip rejected: {reason}");
                        let _ = events.send(BackendEvent::Failed(reason));
                    }
                }
            }
            Ok(LocalCommand::Pause) => {
                if let Some(sink) = &sink {
                    sink.pause();
                }
            }
            Ok(LocalCommand::Resume) => {
                if let Some(sink) = &sink {
                    sink.play();
                }
            }
            Ok(LocalCommand::Stop) => {
                if let Some(sink) = sink.take() {
                    sink.stop();
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                // A drained sink means the clip ended naturally.
                if sink.as_ref().is_some_and(|s| s.empty()) {
                    sink = None;
                    let _ = events.send(BackendEvent::Ended);
                }
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn start_clip(handle: &rodio::OutputStreamHandle, bytes: Vec<u8>) -> Result<rodio::Sink, String> {
    let sink = rodio::Sink::try_new(handle).map_err(|e| format!("sink: {e}"))?;
    let decoder = rodio::Decoder::new(Cursor::new(bytes)).map_err(|e| format!("decode: {e}"))?;
    sink.append(decoder);
    sink.play();
    Ok(sink)
}
