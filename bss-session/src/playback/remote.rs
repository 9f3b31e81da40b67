//! Remote full-track backend
//!
//! Issues device- and credential-scoped playback commands against the
//! vendor API. `is_playing` for this backend is push-driven by the state
//! mirror the capability detector registers, not by command completion, so
//! it may lag actual hardware state by one event.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{AudioBackend, PlaybackError};
use bss_common::links::track_uri;
use bss_common::types::PlaybackSource;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote player driven over the vendor REST surface.
pub struct RemoteBackend {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
    device_id: String,
}

impl RemoteBackend {
    pub fn new(api_base: &str, access_token: &str, device_id: &str) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| crate::Error::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.to_string(),
            access_token: access_token.to_string(),
            device_id: device_id.to_string(),
        })
    }

    async fn command(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), PlaybackError> {
        let url = format!("{}{path}", self.api_base);
        let mut request = self
            .http
            .put(&url)
            .query(&[("device_id", self.device_id.as_str())])
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PlaybackError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlaybackError::Remote(format!(
                "{path} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Set the remote player volume (0.0-1.0), best effort.
    pub async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u32;
        let url = format!("{}/me/player/volume", self.api_base);
        let response = self
            .http
            .put(&url)
            .query(&[
                ("volume_percent", percent.to_string().as_str()),
                ("device_id", self.device_id.as_str()),
            ])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PlaybackError::Remote(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PlaybackError::Remote(format!(
                "volume returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioBackend for RemoteBackend {
    async fn play(&self, source: &PlaybackSource) -> Result<(), PlaybackError> {
        let PlaybackSource::RemoteTrack { track_id } = source else {
            return Err(PlaybackError::Rejected(
                "remote backend plays full tracks only".into(),
            ));
        };
        let body = serde_json::json!({ "uris": [track_uri(track_id)] });
        self.command("/me/player/play", Some(body)).await
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.command("/me/player/pause", None).await
    }

    async fn resume(&self) -> Result<(), PlaybackError> {
        // Play without a uris body resumes the current context.
        self.command("/me/player/play", None).await
    }

    async fn stop(&self) -> Result<(), PlaybackError> {
        // A new play replaces the remote context server-side; pausing is
        // enough to guarantee no overlap, and "nothing playing" is fine.
        if let Err(e) = self.pause().await {
            debug!("remote stop: {e}");
        }
        Ok(())
    }
}
