//! Core type definitions for chunkdb.

use chunkdb_codec::Chunk;
use std::fmt;
use std::sync::Arc;

const OFFSET_BITS: u32 = 32;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

/// Reference to a chunk in the live chunk files.
///
/// Packs the file sequence number into the upper 32 bits and the byte offset
/// of the record within the file into the lower 32 bits, so references order
/// by (sequence, offset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkDiskMapperRef(pub u64);

impl ChunkDiskMapperRef {
    /// Creates a reference from a file sequence number and byte offset.
    #[must_use]
    pub const fn new(seq: u64, offset: u64) -> Self {
        Self((seq << OFFSET_BITS) | (offset & OFFSET_MASK))
    }

    /// Returns the file sequence number.
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.0 >> OFFSET_BITS
    }

    /// Returns the byte offset within the file.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0 & OFFSET_MASK
    }

    /// Returns the (sequence, offset) pair.
    #[must_use]
    pub const fn unpack(self) -> (u64, u64) {
        (self.seq(), self.offset())
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkDiskMapperRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seq(), self.offset())
    }
}

/// Reference to a chunk in persisted segment files. Same layout as
/// [`ChunkDiskMapperRef`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkRef(pub u64);

impl ChunkRef {
    /// Creates a reference from a segment sequence number and byte offset.
    #[must_use]
    pub const fn new(seq: u64, offset: u64) -> Self {
        Self((seq << OFFSET_BITS) | (offset & OFFSET_MASK))
    }

    /// Returns the segment sequence number.
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.0 >> OFFSET_BITS
    }

    /// Returns the byte offset within the segment.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0 & OFFSET_MASK
    }

    /// Returns the (sequence, offset) pair.
    #[must_use]
    pub const fn unpack(self) -> (u64, u64) {
        (self.seq(), self.offset())
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seq(), self.offset())
    }
}

/// Identifier the engine assigns to a series. Never zero for real series;
/// the live file format relies on that to find the end of written data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesRef(pub u64);

impl SeriesRef {
    /// Creates a new series reference.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "series:{}", self.0)
    }
}

/// A chunk together with its time range, as handed to and returned by the
/// segment writer.
#[derive(Debug, Clone, Default)]
pub struct ChunkMeta {
    /// Where the chunk lives. Assigned by
    /// [`SegmentWriter::write_chunks`](crate::SegmentWriter::write_chunks).
    pub chunk_ref: ChunkRef,
    /// Lowest timestamp in the chunk.
    pub min_time: i64,
    /// Highest timestamp in the chunk.
    pub max_time: i64,
    /// The chunk itself. Required for writing.
    pub chunk: Option<Arc<dyn Chunk>>,
}

impl ChunkMeta {
    /// Creates a meta for writing.
    #[must_use]
    pub fn new(chunk: Arc<dyn Chunk>, min_time: i64, max_time: i64) -> Self {
        Self {
            chunk_ref: ChunkRef::default(),
            min_time,
            max_time,
            chunk: Some(chunk),
        }
    }

    /// Creates a meta for reading a chunk back by reference.
    #[must_use]
    pub fn from_ref(chunk_ref: ChunkRef) -> Self {
        Self {
            chunk_ref,
            ..Self::default()
        }
    }
}

/// A chunk read back from the live chunk files.
#[derive(Debug, Clone)]
pub struct MappedChunk {
    /// The decoded chunk.
    pub chunk: Arc<dyn Chunk>,
    /// Whether the chunk was written as out-of-order.
    pub out_of_order: bool,
}

/// One record found by
/// [`ChunkDiskMapper::iterate_all_chunks`](crate::ChunkDiskMapper::iterate_all_chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Series the chunk belongs to.
    pub series_ref: SeriesRef,
    /// Where the chunk lives.
    pub chunk_ref: ChunkDiskMapperRef,
    /// Lowest timestamp in the chunk.
    pub min_time: i64,
    /// Highest timestamp in the chunk.
    pub max_time: i64,
    /// Number of samples, read from the chunk's count prefix.
    pub num_samples: u16,
    /// Chunk encoding with the out-of-order bit stripped.
    pub encoding: chunkdb_codec::Encoding,
    /// Whether the chunk was written as out-of-order.
    pub out_of_order: bool,
}
