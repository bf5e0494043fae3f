//! # Replay Common Library
//!
//! Shared code for the Replay voice-conversion services:
//! - Error type
//! - Event types (ReplayEvent enum) and the broadcast EventBus
//! - Configuration loading and root folder resolution
//! - Content fingerprinting of source audio
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod time;

pub use error::{Error, Result};
