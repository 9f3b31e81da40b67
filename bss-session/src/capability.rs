//! Account capability detection
//!
//! Probes whether the authenticated account can drive a full-track remote
//! player. Probing is fail-open: every failure mode degrades to `Free` so
//! the game is always playable, at worst in preview mode. The probe never
//! surfaces an unrecoverable error to the user.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use bss_common::events::{EventBus, SessionEvent};
use bss_common::types::AccountCapability;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one remote-player initialization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Player ready; remote playback available through this device
    Ready { device_id: String },
    /// Backend says the account cannot drive remote playback
    AccountRestricted,
    /// The initialization call itself failed (network/transient)
    ConnectFailed,
}

/// Port for the remote-player probe; production talks to the vendor API,
/// tests inject scripted outcomes.
#[async_trait]
pub trait RemotePlayerProbe: Send + Sync {
    async fn connect(&self) -> crate::Result<ProbeOutcome>;
}

/// Resolves the account capability, exactly once per session unless
/// explicitly re-invoked.
pub struct CapabilityDetector<P> {
    probe: P,
}

impl<P: RemotePlayerProbe> CapabilityDetector<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Run the probe and settle on a capability.
    ///
    /// Never leaves the result `Unknown` and never returns an error: ready
    /// maps to `Premium`, everything else degrades to `Free`.
    pub async fn detect(&self, events: &EventBus) -> AccountCapability {
        let capability = match self.probe.connect().await {
            Ok(ProbeOutcome::Ready { device_id }) => {
                info!("Remote player ready (premium), device {device_id}");
                AccountCapability::Premium { device_id }
            }
            Ok(ProbeOutcome::AccountRestricted) => {
                info!("Account cannot drive remote playback; preview mode");
                AccountCapability::Free
            }
            Ok(ProbeOutcome::ConnectFailed) => {
                warn!("Remote player connect failed; falling back to preview mode");
                AccountCapability::Free
            }
            Err(e) => {
                warn!("Capability probe error ({e}); falling back to preview mode");
                AccountCapability::Free
            }
        };

        events.emit(SessionEvent::CapabilityResolved {
            capability: capability.clone(),
            timestamp: Utc::now(),
        });
        capability
    }
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    id: Option<String>,
    #[serde(default)]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct PlayerStateResponse {
    #[serde(default)]
    is_playing: bool,
}

/// Probe backed by the vendor devices endpoint.
pub struct VendorProbe {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl VendorProbe {
    pub fn new(api_base: &str, access_token: &str) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| crate::Error::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.to_string(),
            access_token: access_token.to_string(),
        })
    }
}

#[async_trait]
impl RemotePlayerProbe for VendorProbe {
    async fn connect(&self) -> crate::Result<ProbeOutcome> {
        let url = format!("{}/me/player/devices", self.api_base);
        let response = match self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Device probe did not connect: {e}");
                return Ok(ProbeOutcome::ConnectFailed);
            }
        };

        match response.status().as_u16() {
            200 => {
                let body: DevicesResponse = response
                    .json()
                    .await
                    .map_err(|e| crate::Error::Internal(format!("device list: {e}")))?;
                let device_id = body
                    .devices
                    .iter()
                    .find(|d| d.is_active)
                    .or_else(|| body.devices.first())
                    .and_then(|d| d.id.clone());
                match device_id {
                    Some(device_id) => Ok(ProbeOutcome::Ready { device_id }),
                    // Account could drive a player, but nothing to drive.
                    None => Ok(ProbeOutcome::ConnectFailed),
                }
            }
            401 | 403 => Ok(ProbeOutcome::AccountRestricted),
            _ => Ok(ProbeOutcome::ConnectFailed),
        }
    }
}

/// Spawn the persistent player-state mirror for a premium session.
///
/// Mirrors play/pause from the remote player into the driver's observable
/// `is_playing` flag. Push-driven consumers may lag actual hardware state
/// by one poll; that is inherent to the mirror, not a bug in consumers.
/// The task runs for the life of the premium session; abort the handle on
/// shutdown.
pub fn spawn_state_mirror(
    api_base: String,
    access_token: String,
    poll_interval: Duration,
    is_playing: Arc<watch::Sender<bool>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let http = match reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() {
            Ok(http) => http,
            Err(e) => {
                warn!("State mirror disabled, no http client: {e}");
                return;
            }
        };
        let url = format!("{api_base}/me/player");
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Ok(response) = http.get(&url).bearer_auth(&access_token).send().await else {
                continue;
            };
            // 204 means no active playback context; leave the flag alone.
            if response.status().as_u16() != 200 {
                continue;
            }
            let Ok(state) = response.json::<PlayerStateResponse>().await else {
                continue;
            };
            if *is_playing.borrow() != state.is_playing {
                let _ = is_playing.send(state.is_playing);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedProbe(crate::Result<ProbeOutcome>);

    #[async_trait]
    impl RemotePlayerProbe for ScriptedProbe {
        async fn connect(&self) -> crate::Result<ProbeOutcome> {
            match &self.0 {
                Ok(outcome) => Ok(outcome.clone()),
                Err(_) => Err(crate::Error::Internal("probe blew up".into())),
            }
        }
    }

    #[tokio::test]
    async fn ready_probe_resolves_premium() {
        let detector = CapabilityDetector::new(ScriptedProbe(Ok(ProbeOutcome::Ready {
            device_id: "dev-1".into(),
        })));
        let capability = detector.detect(&EventBus::new()).await;
        assert_eq!(
            capability,
            AccountCapability::Premium {
                device_id: "dev-1".into()
            }
        );
    }

    #[tokio::test]
    async fn every_failure_mode_resolves_free_never_unknown() {
        let outcomes: Vec<ScriptedProbe> = vec![
            ScriptedProbe(Ok(ProbeOutcome::AccountRestricted)),
            ScriptedProbe(Ok(ProbeOutcome::ConnectFailed)),
            ScriptedProbe(Err(crate::Error::Internal("boom".into()))),
        ];
        for probe in outcomes {
            let detector = CapabilityDetector::new(probe);
            let capability = detector.detect(&EventBus::new()).await;
            assert_eq!(capability, AccountCapability::Free);
        }
    }

    #[tokio::test]
    async fn detection_emits_a_resolved_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let detector = CapabilityDetector::new(ScriptedProbe(Ok(ProbeOutcome::ConnectFailed)));
        detector.detect(&bus).await;

        match rx.recv().await {
            Ok(SessionEvent::CapabilityResolved { capability, .. }) => {
                assert_eq!(capability, AccountCapability::Free)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
