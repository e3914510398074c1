//! Persisted chunk segments.
//!
//! Segments hold chunks that will not change again. They are written in
//! batches by [`SegmentWriter`] and read back by reference through
//! [`SegmentReader`]. Unlike the live files managed by
//! [`ChunkDiskMapper`](crate::ChunkDiskMapper), records carry no series or
//! time range; that information lives in the caller's index.
//!
//! ```text
//! <dir>/
//! ├─ 000001   | header | len | enc | data | crc | len | enc | data | crc | ...
//! └─ 000002
//! ```

mod reader;
mod writer;

pub use reader::SegmentReader;
pub use writer::SegmentWriter;
