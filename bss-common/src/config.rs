//! Configuration loading
//!
//! Priority order: command-line argument / environment variable (handled by
//! clap in the binary) > TOML config file > compiled defaults. Absent TOML
//! keys fall back to the compiled defaults field by field.

use serde::Deserialize;
use std::path::Path;

use crate::{Error, Result};

/// Session orchestrator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP port the control surface binds to
    pub port: u16,

    /// Vendor Web API base URL
    pub api_base_url: String,

    /// Public embed page base URL, used by the preview scrape fallback
    pub embed_base_url: String,

    /// Bearer credential for the vendor API (the login flow that produces
    /// it is external to this service)
    pub access_token: String,

    /// Front-back tilt angle, in degrees, treated as face-down.
    ///
    /// Orientation sensors are noisy near the physical limit, so the
    /// threshold sits below 180 while still requiring a near-complete flip.
    pub flip_threshold_degrees: f64,

    /// Bingo per-track play window in seconds
    pub bingo_countdown_secs: u64,

    /// Silence between bingo tracks in milliseconds
    pub bingo_gap_ms: u64,

    /// Ceiling for a preview round when the backend never reports "ended"
    pub preview_ceiling_secs: u64,

    /// Ceiling for a remote round when the backend never reports "ended"
    pub remote_ceiling_secs: u64,

    /// Interval of the premium player-state mirror poll, in seconds
    pub state_poll_secs: u64,

    /// Initial remote player volume (0.0-1.0)
    pub remote_volume: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5750,
            api_base_url: "https://api.spotify.com/v1".to_string(),
            embed_base_url: "https://open.spotify.com/embed".to_string(),
            access_token: String::new(),
            flip_threshold_degrees: 150.0,
            bingo_countdown_secs: 30,
            bingo_gap_ms: 1000,
            preview_ceiling_secs: 45,
            remote_ceiling_secs: 480,
            state_poll_secs: 5,
            remote_volume: 0.5,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Load from a TOML file if one is given, otherwise compiled defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.flip_threshold_degrees, 150.0);
        assert_eq!(config.bingo_countdown_secs, 30);
        assert_eq!(config.bingo_gap_ms, 1000);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_absent_keys() {
        let config: Config = toml::from_str("port = 9000\naccess_token = \"tok\"").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.access_token, "tok");
        assert_eq!(config.bingo_countdown_secs, 30);
        assert_eq!(config.api_base_url, "https://api.spotify.com/v1");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let result = Config::load(Path::new("/nonexistent/bss.toml"));
        assert!(result.is_err());
    }
}
