//! Error types for chunkdb core.

use crate::framed::FrameError;
use chunkdb_codec::CodecError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in chunkdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] chunkdb_storage::StorageError),

    /// Chunk codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A chunk file is corrupted. Carries the directory and file index so the
    /// damage can be cut away with
    /// [`ChunkDiskMapper::delete_corrupted`](crate::ChunkDiskMapper::delete_corrupted).
    #[error(transparent)]
    Corruption(#[from] CorruptionError),

    /// The mapper has been closed.
    #[error("chunk disk mapper is closed")]
    MapperClosed,

    /// The write queue has been stopped.
    #[error("write queue is not running")]
    QueueNotRunning,

    /// The write queue was closed while a job was being added.
    #[error("write queue is closed")]
    QueueClosed,

    /// A freshly cut file does not start where the precomputed reference
    /// said it would.
    #[error(
        "expected newly cut file to have sequence:offset {expected_seq}:{expected_offset}, \
         got {actual_seq}:{actual_offset}"
    )]
    CutMismatch {
        /// Sequence the reference pointed to.
        expected_seq: u64,
        /// Offset the reference pointed to.
        expected_offset: u64,
        /// Sequence of the file that was cut.
        actual_seq: u64,
        /// Offset of the first record in the file that was cut.
        actual_offset: u64,
    },

    /// Chunk files on disk have a gap in their sequence numbers.
    #[error("found unsequential chunk files {previous} and {next}")]
    UnsequentialFiles {
        /// Sequence before the gap.
        previous: u64,
        /// Sequence after the gap.
        next: u64,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the corruption details if this is a corruption error.
    #[must_use]
    pub fn as_corruption(&self) -> Option<&CorruptionError> {
        match self {
            Self::Corruption(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true for corruption errors.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        self.as_corruption().is_some()
    }
}

/// A corrupted chunk file, identified by directory and sequence number.
#[derive(Debug, Error)]
pub struct CorruptionError {
    /// Directory holding the file.
    pub dir: PathBuf,
    /// Sequence number of the corrupted file, if one could be attributed.
    pub file_index: Option<u64>,
    /// What was wrong.
    #[source]
    pub cause: CorruptionCause,
}

impl CorruptionError {
    /// Creates a corruption error for the file with sequence `file_index`.
    pub fn new(dir: impl Into<PathBuf>, file_index: Option<u64>, cause: CorruptionCause) -> Self {
        Self {
            dir: dir.into(),
            file_index,
            cause,
        }
    }
}

impl fmt::Display for CorruptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file_index {
            Some(index) => write!(
                f,
                "corruption in chunk file {} (index {index}): {}",
                self.dir.display(),
                self.cause
            ),
            None => write!(
                f,
                "corruption in chunk directory {}: {}",
                self.dir.display(),
                self.cause
            ),
        }
    }
}

/// The specific kind of damage found in a chunk file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptionCause {
    /// The file header does not carry the expected magic number.
    #[error("invalid magic number {actual:#010x}, expected {expected:#010x}")]
    BadMagic {
        /// Magic number for this kind of file.
        expected: u32,
        /// Magic number found.
        actual: u32,
    },

    /// The file header carries an unknown format version.
    #[error("invalid chunk format version {0}")]
    BadVersion(u8),

    /// A header or record extends past the end of the file.
    #[error(
        "not enough bytes at offset {offset}: required {required}, available {available}"
    )]
    ShortRead {
        /// Offset the read started at.
        offset: u64,
        /// End offset the read needed.
        required: u64,
        /// Bytes available in the file.
        available: u64,
    },

    /// A record length field is not a valid varint.
    #[error("invalid chunk length at offset {offset}")]
    BadVarint {
        /// Offset of the length field.
        offset: u64,
    },

    /// A record checksum does not match its contents.
    #[error("checksum mismatch expected:{expected:08x}, actual:{actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the file.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// The reference points at a file that does not exist.
    #[error("chunk file {seq} does not exist")]
    MissingFile {
        /// Sequence number of the missing file.
        seq: u64,
    },

    /// The record was read intact but the codec rejected its data.
    #[error("decoding chunk: {0}")]
    Decode(CodecError),
}

impl From<FrameError> for CorruptionCause {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::OutOfRange { start, end, len } => Self::ShortRead {
                offset: start as u64,
                required: end as u64,
                available: len as u64,
            },
            FrameError::BadVarint { offset } => Self::BadVarint {
                offset: offset as u64,
            },
            FrameError::ChecksumMismatch { expected, actual } => {
                Self::ChecksumMismatch { expected, actual }
            }
        }
    }
}
