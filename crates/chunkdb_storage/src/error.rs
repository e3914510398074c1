//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A range access fell outside the available bytes.
    #[error("range {start}..{end} out of bounds for view of {len} bytes")]
    OutOfRange {
        /// Requested start offset.
        start: usize,
        /// Requested end offset (exclusive).
        end: usize,
        /// Number of bytes available in the view.
        len: usize,
    },

    /// A caller passed an argument the storage layer cannot honour.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
