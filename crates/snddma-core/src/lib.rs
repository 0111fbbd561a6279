//! # snddma-core
//!
//! Core types, sizing policy, configuration, and error handling for the
//! snddma audio bridge.

pub mod config;
pub mod error;
pub mod types;

pub use config::SoundConfig;
pub use error::{Error, Result};
pub use types::*;
