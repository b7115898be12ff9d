//! Error handling for PulseKit
//!
//! Provides the error types shared by every acquisition crate:
//! - Queue errors (the persistent exchange-data queue)
//! - Module errors (the key/value surface exposed to the host scheduler)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Queue error type
///
/// Represents failures of the exchange-data queue the output module commits to.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// The queue reached its hard capacity
    #[error("Queue full: capacity {capacity} reached")]
    Full {
        /// The configured capacity.
        capacity: usize,
    },

    /// A stored record could not be decoded
    #[error("Corrupted queue record at line {line}: {reason}")]
    Corrupted {
        /// 1-based line number of the bad record.
        line: usize,
        /// The decoding failure.
        reason: String,
    },
}

/// Module error type
///
/// Represents misuse of a CNC module's key/value surface.
#[derive(Error, Debug, Clone)]
pub enum ModuleError {
    /// The key is not handled by this module
    #[error("Unknown key '{key}' for module {module}")]
    UnknownKey {
        /// The module name.
        module: String,
        /// The requested key.
        key: String,
    },

    /// The value has the wrong shape for the key
    #[error("Invalid value for '{key}': expected {expected}, got {actual}")]
    InvalidValue {
        /// The key being set.
        key: String,
        /// The expected value kind.
        expected: String,
        /// The received value, rendered.
        actual: String,
    },

    /// A setter was called before the first `start`
    #[error("Module not started")]
    NotStarted,

    /// The module cannot serve the request right now
    #[error("Module unavailable: {reason}")]
    Unavailable {
        /// Why the module is unavailable.
        reason: String,
    },
}

/// Main error type for PulseKit
///
/// A unified error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Queue error
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Module error
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a queue error
    pub fn is_queue_error(&self) -> bool {
        matches!(self, Error::Queue(_))
    }

    /// Check if this is a module error
    pub fn is_module_error(&self) -> bool {
        matches!(self, Error::Module(_))
    }

    /// Check if the queue refused data because it is full
    pub fn is_queue_full(&self) -> bool {
        matches!(self, Error::Queue(QueueError::Full { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::Full { capacity: 10 };
        assert_eq!(err.to_string(), "Queue full: capacity 10 reached");

        let err = QueueError::Corrupted {
            line: 3,
            reason: "EOF".to_string(),
        };
        assert_eq!(err.to_string(), "Corrupted queue record at line 3: EOF");
    }

    #[test]
    fn test_module_error_display() {
        let err = ModuleError::UnknownKey {
            module: "output".to_string(),
            key: "Foo".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown key 'Foo' for module output");
        assert_eq!(ModuleError::NotStarted.to_string(), "Module not started");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = QueueError::Corrupted {
            line: 1,
            reason: "bad".to_string(),
        }
        .into();
        assert!(err.is_queue_error());
        assert!(!err.is_queue_full());

        let err: Error = QueueError::Full { capacity: 1 }.into();
        assert!(err.is_queue_full());

        let err: Error = ModuleError::NotStarted.into();
        assert!(err.is_module_error());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
