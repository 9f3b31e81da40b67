//! # BSS Session Orchestrator Library (bss-session)
//!
//! Core of the blind-listening party game: capability detection, preview
//! and playlist resolution, the flip-gated reveal, the playback driver over
//! remote and local backends, the single-track state machine, and the
//! bingo draw engine, fronted by an HTTP/SSE control surface.
//!
//! **Architecture:** single tokio runtime; all playback commands funnel
//! through the owning state machine or draw engine, never directly into a
//! backend from two call sites.

pub mod api;
pub mod bingo;
pub mod capability;
pub mod error;
pub mod gate;
pub mod playback;
pub mod resolver;
pub mod service;
pub mod session;

pub use error::{Error, Result};
pub use service::SessionService;
