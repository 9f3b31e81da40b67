//! Resolver clients for the two lookup services
//!
//! `preview` resolves a short-audio clip URL for a single track; `playlist`
//! resolves a playlist into a flat track list. Both distinguish a
//! legitimate "not found" outcome (an `Ok` value the caller handles by
//! prompting for another pick) from a resolution failure (`Err`, retryable).

mod playlist;
mod preview;

pub use playlist::PlaylistResolver;
pub use preview::{extract_preview_url, resolve_with_retry, unescape_json_str, PreviewResolver, PreviewSource};

use thiserror::Error;

/// Resolution failures, distinct from "legitimately not found"
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Transport-level failure reaching the service
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the service
    #[error("API error {0}")]
    Status(u16),

    /// Response body did not parse
    #[error("Parse error: {0}")]
    Parse(String),
}
