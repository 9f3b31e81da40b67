//! # BSS Common Library
//!
//! Shared code for the BSS session orchestrator:
//! - Domain types (tracks, capability tiers, play history)
//! - Scanned-link classification
//! - Event types (SessionEvent enum) and broadcast bus
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod links;
pub mod types;

pub use error::{Error, Result};
