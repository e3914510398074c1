//! # chunkdb core
//!
//! On-disk chunk storage for a time-series head.
//!
//! This crate provides:
//! - [`ChunkDiskMapper`]: live, append-only chunk files that can be read back
//!   by reference while they are still being written
//! - [`ChunkWriteQueue`](queue::ChunkWriteQueue): asynchronous writes with
//!   backpressure, backed by a segmented job queue
//! - [`PendingChunks`]: queued and unflushed chunks, readable until they
//!   reach the file
//! - [`SegmentWriter`] and [`SegmentReader`]: persisted, size-bounded
//!   segment files
//!
//! ## Example
//!
//! ```no_run
//! use chunkdb_codec::{Chunk, DefaultPool, Sample, SampleChunk};
//! use chunkdb_core::{ChunkDiskMapper, MapperConfig, SeriesRef};
//! use std::sync::Arc;
//!
//! # fn main() -> chunkdb_core::CoreResult<()> {
//! let mapper = ChunkDiskMapper::open("data/chunks_head", Arc::new(DefaultPool), MapperConfig::default())?;
//! let chunk = SampleChunk::from_samples(&[Sample::new(1000, 1.5), Sample::new(2000, 2.5)])?;
//! let chunk_ref = mapper.write_chunk(SeriesRef::new(1), 1000, 2000, Arc::new(chunk), false, |result| {
//!     if let Err(err) = result {
//!         eprintln!("chunk write failed: {err}");
//!     }
//! })?;
//! let mapped = mapper.chunk(chunk_ref)?;
//! assert_eq!(mapped.chunk.num_samples(), 2);
//! mapper.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod format;
pub mod framed;
pub mod mapper;
pub mod pending;
pub mod queue;
pub mod segment;
mod stats;
mod types;

pub use config::{
    MapperConfig, SegmentConfig, WriteQueueConfig, DEFAULT_MAX_FILE_SIZE, DEFAULT_PENDING_SHARDS,
    DEFAULT_SEGMENT_SIZE, DEFAULT_WRITE_BUFFER_SIZE, MAX_WRITE_BUFFER_SIZE, MIN_WRITE_BUFFER_SIZE,
};
pub use error::{CoreError, CoreResult, CorruptionCause, CorruptionError};
pub use mapper::{remove_files_from, ChunkDiskMapper};
pub use pending::{PendingChunk, PendingChunks};
pub use segment::{SegmentReader, SegmentWriter};
pub use stats::{QueueStats, QueueStatsSnapshot};
pub use types::{ChunkDiskMapperRef, ChunkMeta, ChunkRecord, ChunkRef, MappedChunk, SeriesRef};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
