//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding chunks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The encoding tag is not known to the pool.
    #[error("unknown chunk encoding {0}")]
    UnknownEncoding(u8),

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A varint ran past ten bytes.
    #[error("varint overflows 64 bits")]
    VarintOverflow,

    /// The chunk bytes do not follow the encoding's layout.
    #[error("invalid chunk structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// The chunk already holds the maximum number of samples.
    #[error("chunk is full ({0} samples)")]
    ChunkFull(usize),

    /// The operation is not available for this encoding.
    #[error("operation not supported for encoding {0}")]
    Unsupported(u8),
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
