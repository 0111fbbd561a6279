//! Error types for snddma.

use thiserror::Error;

/// Result type alias using snddma's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for snddma.
#[derive(Error, Debug)]
pub enum Error {
    // Lifecycle errors
    #[error("Audio initialization failed: {0}")]
    Initialization(String),

    #[error("Failed to query device format: {0}")]
    FormatQuery(String),

    #[error("Failed to allocate {bytes} byte DMA buffer")]
    Allocation { bytes: usize },

    // Host stream errors
    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Audio capture error: {0}")]
    Capture(String),

    // Configuration errors
    #[error("Invalid sound configuration: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the failed operation may succeed when retried.
    ///
    /// Initialization is all-or-nothing, so a failed `init` leaves nothing
    /// behind and can simply be called again.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Initialization(_) | Self::Allocation { .. } | Self::Stream(_)
        )
    }
}
