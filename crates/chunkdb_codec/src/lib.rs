//! # chunkdb Codec
//!
//! The chunk codec used by the chunk store.
//!
//! The store itself never looks inside a chunk. It persists the bytes and the
//! [`Encoding`] tag of anything implementing [`Chunk`] and rebuilds chunks on
//! read through a [`ChunkPool`]. This crate provides:
//!
//! - [`Encoding`] tags and the [`Chunk`] trait
//! - [`RawChunk`] for opaque payloads and [`SampleChunk`] for timestamped
//!   float samples
//! - [`DefaultPool`], mapping tags to the chunk types above
//! - Unsigned and zigzag varints, used by the on-disk record format
//!
//! ## Example
//!
//! ```rust
//! use chunkdb_codec::{Chunk, ChunkPool, DefaultPool, SampleChunk};
//!
//! let mut chunk = SampleChunk::new();
//! chunk.append(1000, 42.0).unwrap();
//!
//! let rebuilt = DefaultPool.get(chunk.encoding(), chunk.to_bytes()).unwrap();
//! assert_eq!(rebuilt.num_samples(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod encoding;
mod error;
mod pool;
mod sample;
pub mod varint;

pub use chunk::{sample_count, Chunk, RawChunk, Sample};
pub use encoding::Encoding;
pub use error::{CodecError, CodecResult};
pub use pool::{ChunkPool, DefaultPool};
pub use sample::SampleChunk;
