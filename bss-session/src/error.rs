//! Error types for bss-session
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Component failures are recovered at their boundary and
//! converted to user-facing outcomes; these errors describe what went
//! wrong on the way there.

use thiserror::Error;

/// Main error type for the bss-session module
#[derive(Error, Debug)]
pub enum Error {
    /// Operation not legal in the current phase or mode
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Decoded payload is not a recognized track or playlist link
    #[error("Unrecognized scan payload: {0}")]
    ScanFormat(String),

    /// Preview or playlist fetch failed (network or HTTP status)
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// Playback could not start or aborted
    #[error("Playback error: {0}")]
    Playback(String),

    /// Orientation access was denied; the flip-gated flow cannot run
    #[error("Orientation permission denied")]
    PermissionDenied,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from the common crate
    #[error(transparent)]
    Common(#[from] bss_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using bss-session Error
pub type Result<T> = std::result::Result<T, Error>;
