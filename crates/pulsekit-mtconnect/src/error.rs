//! Error types for the SHDR adapter

use crate::datum::DatumKind;
use pulsekit_core::ModuleError;
use thiserror::Error;

/// Errors raised by data items and the SHDR server
#[derive(Error, Debug)]
pub enum ShdrError {
    /// A value does not fit the kind of the data item
    #[error("Data item '{name}' of kind {kind} cannot hold {value}")]
    KindMismatch {
        /// Data item name.
        name: String,
        /// Data item kind.
        kind: DatumKind,
        /// The rejected value, rendered.
        value: String,
    },

    /// The listener could not be bound
    #[error("Failed to bind SHDR server on port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Socket error
    #[error("SHDR I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the SHDR adapter
pub type ShdrResult<T> = std::result::Result<T, ShdrError>;

impl From<ShdrError> for pulsekit_core::Error {
    fn from(err: ShdrError) -> Self {
        match err {
            ShdrError::KindMismatch { name, kind, value } => ModuleError::InvalidValue {
                key: name,
                expected: kind.to_string(),
                actual: value,
            }
            .into(),
            ShdrError::Bind { .. } => ModuleError::Unavailable {
                reason: err.to_string(),
            }
            .into(),
            ShdrError::Io(e) => pulsekit_core::Error::Io(e),
        }
    }
}
