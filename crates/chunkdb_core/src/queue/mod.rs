//! Write queues.
//!
//! - [`JobQueue`]: the bounded FIFO underneath
//! - [`ChunkWriteQueue`]: asynchronous chunk writes with a single worker

mod job_queue;
mod write_queue;

pub use job_queue::JobQueue;
pub use write_queue::{ChunkWriteQueue, WriteCallback, WriteFn, WriteJob};
