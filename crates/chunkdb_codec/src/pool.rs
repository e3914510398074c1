//! Chunk construction from persisted bytes.

use crate::chunk::{Chunk, RawChunk};
use crate::encoding::Encoding;
use crate::error::{CodecError, CodecResult};
use crate::sample::SampleChunk;
use bytes::Bytes;
use std::sync::Arc;

/// Builds chunks from an encoding tag and the bytes read from disk.
///
/// The chunk store receives a pool at construction time and calls it for
/// every chunk it reads back, so alternative encodings can be plugged in
/// without touching the store.
pub trait ChunkPool: Send + Sync {
    /// Builds a chunk of the given encoding over `data`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownEncoding`] for encodings the pool does not
    /// handle, or a decoding error if `data` is malformed.
    fn get(&self, encoding: Encoding, data: Bytes) -> CodecResult<Arc<dyn Chunk>>;
}

/// The pool for the encodings shipped with this crate.
///
/// | Encoding | Chunk |
/// |----------|-------|
/// | [`Encoding::NONE`] | [`RawChunk`] |
/// | [`Encoding::DELTA`] | [`SampleChunk`] |
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPool;

impl DefaultPool {
    /// Creates the default pool.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ChunkPool for DefaultPool {
    fn get(&self, encoding: Encoding, data: Bytes) -> CodecResult<Arc<dyn Chunk>> {
        match encoding {
            Encoding::NONE => Ok(Arc::new(RawChunk::new(data))),
            Encoding::DELTA => Ok(Arc::new(SampleChunk::from_bytes(data)?)),
            other => Err(CodecError::UnknownEncoding(other.as_u8())),
        }
    }
}
