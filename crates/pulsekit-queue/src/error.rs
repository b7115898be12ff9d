//! Error types for the queue crate.
//!
//! Queue and module failures use the shared [`pulsekit_core::Error`]; this
//! module only covers the configuration of cycle detection.

use thiserror::Error;

/// Errors raised while configuring detection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// The detection method name is not known.
    #[error("Unknown detection method: {0}")]
    UnknownMethod(String),
}

impl From<DetectionError> for pulsekit_core::Error {
    fn from(err: DetectionError) -> Self {
        pulsekit_core::Error::other(err.to_string())
    }
}

/// Result type alias for detection configuration.
pub type DetectionResult<T> = Result<T, DetectionError>;
