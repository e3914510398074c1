//! The chunk abstraction shared by the codec and the chunk store.

use crate::encoding::Encoding;
use crate::error::{CodecError, CodecResult};
use bytes::Bytes;
use std::fmt;

/// A single time-series sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Timestamp in milliseconds.
    pub t: i64,
    /// Sample value.
    pub v: f64,
}

impl Sample {
    /// Creates a new sample.
    #[must_use]
    pub const fn new(t: i64, v: f64) -> Self {
        Self { t, v }
    }
}

/// An encoded chunk of samples.
///
/// The chunk store treats chunks as opaque: it persists [`Chunk::bytes`]
/// together with [`Chunk::encoding`] and hands both back to a
/// [`crate::ChunkPool`] to rebuild the chunk on read.
///
/// By convention every sample-bearing encoding starts its bytes with a
/// two-byte big-endian sample count, which lets the store report sample
/// counts without decoding (see [`sample_count`]).
pub trait Chunk: Send + Sync + fmt::Debug {
    /// Returns the encoded bytes.
    fn bytes(&self) -> &[u8];

    /// Returns the encoding of [`Chunk::bytes`].
    fn encoding(&self) -> Encoding;

    /// Returns the number of samples in the chunk.
    fn num_samples(&self) -> usize;

    /// Decodes every sample in the chunk.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unsupported`] for encodings without sample
    /// structure, or a decoding error if the bytes are malformed.
    fn samples(&self) -> CodecResult<Vec<Sample>> {
        Err(CodecError::Unsupported(self.encoding().as_u8()))
    }
}

/// Reads the sample count prefix of an encoded chunk without decoding it.
///
/// Returns 0 for [`Encoding::NONE`] and for data shorter than the prefix.
#[must_use]
pub fn sample_count(encoding: Encoding, data: &[u8]) -> u16 {
    if encoding == Encoding::NONE || data.len() < 2 {
        return 0;
    }
    u16::from_be_bytes([data[0], data[1]])
}

/// A chunk of opaque bytes with [`Encoding::NONE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    data: Bytes,
}

impl RawChunk {
    /// Wraps the given bytes.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl Chunk for RawChunk {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn encoding(&self) -> Encoding {
        Encoding::NONE
    }

    fn num_samples(&self) -> usize {
        0
    }
}
