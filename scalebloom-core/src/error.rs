//! Error types for scalebloom

use thiserror::Error;

/// Result type alias for scalebloom operations
pub type Result<T> = std::result::Result<T, BloomError>;

/// scalebloom error types
#[derive(Error, Debug)]
pub enum BloomError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid filter or store configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Segment parameters could not be derived
    #[error("Sizing error for segment {segment}: {reason}")]
    Sizing { segment: u64, reason: String },

    /// The atomic unit is not registered with the backing store
    #[error("Atomic unit not registered: {0}")]
    UnitNotFound(String),

    /// The backing store rejected a command
    #[error("Store error: {0}")]
    Store(String),

    /// The backing store could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid data format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl BloomError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, BloomError::Io(_) | BloomError::Connection(_))
    }

    /// Check if the store reported that the atomic unit is missing
    pub fn is_unit_missing(&self) -> bool {
        matches!(self, BloomError::UnitNotFound(_))
    }

    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            BloomError::Corruption(_) | BloomError::ChecksumMismatch { .. }
        )
    }

    pub(crate) fn sizing(segment: u64, reason: impl Into<String>) -> Self {
        BloomError::Sizing {
            segment,
            reason: reason.into(),
        }
    }
}
