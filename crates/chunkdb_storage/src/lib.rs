//! # ChunkDB Storage
//!
//! File system layer for ChunkDB.
//!
//! This crate provides the lowest-level storage pieces the chunk store is
//! built on. It is **format agnostic**: it never interprets segment headers
//! or chunk records.
//!
//! ## Design Principles
//!
//! - Views are read-only and every range access is bounds-checked
//! - Segment files are named by their sequence number and created atomically
//! - Preallocation, truncation and directory syncs live here, not in callers
//! - ChunkDB owns all file format interpretation
//!
//! ## Available Views
//!
//! - [`InMemoryBytes`] - For testing and whole-file reads
//! - [`MappedFile`] - Memory-mapped segment files
//!
//! ## Example
//!
//! ```rust
//! use chunkdb_storage::{ByteView, InMemoryBytes};
//!
//! let view = InMemoryBytes::new(b"hello world".to_vec());
//! assert_eq!(view.range(0, 5).unwrap(), b"hello");
//! ```

#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod mmap;
mod view;

pub use error::{StorageError, StorageResult};
pub use file::{
    cut_segment_file, dir_size, list_sequence_files, next_sequence_file, preallocate_file,
    remove_temp_files, segment_file_path, sync_dir, truncate_file, CutFile,
};
pub use memory::InMemoryBytes;
pub use mmap::MappedFile;
pub use view::ByteView;
