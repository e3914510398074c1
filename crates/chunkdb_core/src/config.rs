//! Chunk store configuration.

use crate::error::{CoreError, CoreResult};
use crate::format::{CRC32_CASTAGNOLI, HEADER_SIZE, MAX_LIVE_META_SIZE};
use crc::Crc;
use std::fmt;
use std::time::Duration;

/// Default maximum size of a live chunk file.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 128 * 1024 * 1024;
/// Default write buffer size.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;
/// Smallest accepted write buffer size.
pub const MIN_WRITE_BUFFER_SIZE: usize = 64 * 1024;
/// Largest accepted write buffer size.
pub const MAX_WRITE_BUFFER_SIZE: usize = 8 * 1024 * 1024;
/// Default number of pending table shards.
pub const DEFAULT_PENDING_SHARDS: usize = 128;
/// Default persisted segment size.
pub const DEFAULT_SEGMENT_SIZE: u64 = 512 * 1024 * 1024;

/// Configuration for [`ChunkDiskMapper`](crate::ChunkDiskMapper).
#[derive(Clone)]
pub struct MapperConfig {
    /// Size at which a live file is cut.
    pub max_file_size: u64,

    /// Size of the write buffer in front of the current file.
    pub write_buffer_size: usize,

    /// Capacity of the asynchronous write queue (0 = write synchronously).
    pub write_queue_size: usize,

    /// Number of shards in the pending-chunk table.
    pub pending_shards: usize,

    /// Tuning for the write queue and pending table.
    pub queue: WriteQueueConfig,

    /// Record checksum.
    pub checksum: &'static Crc<u32>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            write_queue_size: 0,
            pending_shards: DEFAULT_PENDING_SHARDS,
            queue: WriteQueueConfig::default(),
            checksum: &CRC32_CASTAGNOLI,
        }
    }
}

impl fmt::Debug for MapperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperConfig")
            .field("max_file_size", &self.max_file_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("write_queue_size", &self.write_queue_size)
            .field("pending_shards", &self.pending_shards)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl MapperConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size at which live files are cut.
    #[must_use]
    pub const fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Sets the write buffer size.
    #[must_use]
    pub const fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Sets the write queue capacity (0 disables the queue).
    #[must_use]
    pub const fn write_queue_size(mut self, size: usize) -> Self {
        self.write_queue_size = size;
        self
    }

    /// Sets the number of pending table shards.
    #[must_use]
    pub const fn pending_shards(mut self, shards: usize) -> Self {
        self.pending_shards = shards;
        self
    }

    /// Sets the write queue tuning.
    #[must_use]
    pub const fn queue(mut self, queue: WriteQueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Sets the record checksum.
    #[must_use]
    pub const fn checksum(mut self, checksum: &'static Crc<u32>) -> Self {
        self.checksum = checksum;
        self
    }

    /// Checks that the values can be used.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] describing the first bad value.
    pub fn validate(&self) -> CoreResult<()> {
        if self.write_buffer_size < MIN_WRITE_BUFFER_SIZE
            || self.write_buffer_size > MAX_WRITE_BUFFER_SIZE
        {
            return Err(CoreError::invalid_operation(format!(
                "write buffer size {} must be between {MIN_WRITE_BUFFER_SIZE} and {MAX_WRITE_BUFFER_SIZE} bytes",
                self.write_buffer_size
            )));
        }
        if self.write_buffer_size % 1024 != 0 {
            return Err(CoreError::invalid_operation(format!(
                "write buffer size {} must be a multiple of 1024",
                self.write_buffer_size
            )));
        }
        let min_file = (HEADER_SIZE + MAX_LIVE_META_SIZE) as u64;
        if self.max_file_size < min_file || self.max_file_size > u64::from(u32::MAX) {
            return Err(CoreError::invalid_operation(format!(
                "max file size {} must be between {min_file} and {} bytes",
                self.max_file_size,
                u32::MAX
            )));
        }
        if self.pending_shards == 0 {
            return Err(CoreError::invalid_operation(
                "pending table needs at least one shard",
            ));
        }
        Ok(())
    }
}

/// Tuning for [`ChunkWriteQueue`](crate::queue::ChunkWriteQueue) and its
/// pending-chunk table.
#[derive(Debug, Clone)]
pub struct WriteQueueConfig {
    /// Maximum number of queued jobs.
    pub capacity: usize,

    /// Upper bound on the number of slots per queue segment.
    pub max_segment_size: usize,

    /// Peak table size at which the table is reallocated once it drains.
    pub shrink_threshold: usize,

    /// Minimum time between two reallocations of the table.
    pub shrink_interval: Duration,
}

impl Default for WriteQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_segment_size: 8192,
            shrink_threshold: 1000,
            shrink_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl WriteQueueConfig {
    /// Creates a configuration for a queue of `capacity` jobs.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the maximum queue segment size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the shrink threshold.
    #[must_use]
    pub const fn shrink_threshold(mut self, threshold: usize) -> Self {
        self.shrink_threshold = threshold;
        self
    }

    /// Sets the shrink interval.
    #[must_use]
    pub const fn shrink_interval(mut self, interval: Duration) -> Self {
        self.shrink_interval = interval;
        self
    }

    /// Slots per queue segment: the capacity, capped at `max_segment_size`.
    #[must_use]
    pub fn segment_size(&self) -> usize {
        self.capacity.min(self.max_segment_size).max(1)
    }
}

/// Configuration for [`SegmentWriter`](crate::SegmentWriter) and
/// [`SegmentReader`](crate::SegmentReader).
#[derive(Clone)]
pub struct SegmentConfig {
    /// Byte budget per segment file.
    pub segment_size: u64,

    /// Record checksum.
    pub checksum: &'static Crc<u32>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            checksum: &CRC32_CASTAGNOLI,
        }
    }
}

impl fmt::Debug for SegmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentConfig")
            .field("segment_size", &self.segment_size)
            .finish_non_exhaustive()
    }
}

impl SegmentConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment size. Zero selects the default.
    #[must_use]
    pub const fn segment_size(mut self, size: u64) -> Self {
        self.segment_size = if size == 0 { DEFAULT_SEGMENT_SIZE } else { size };
        self
    }

    /// Sets the record checksum.
    #[must_use]
    pub const fn checksum(mut self, checksum: &'static Crc<u32>) -> Self {
        self.checksum = checksum;
        self
    }

    /// Checks that the values can be used.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the segment size cannot be
    /// addressed by a chunk reference's 32-bit offset.
    pub fn validate(&self) -> CoreResult<()> {
        let min_size = HEADER_SIZE as u64;
        if self.segment_size <= min_size || self.segment_size > u64::from(u32::MAX) {
            return Err(CoreError::invalid_operation(format!(
                "segment size {} must be above {min_size} and at most {} bytes",
                self.segment_size,
                u32::MAX
            )));
        }
        Ok(())
    }
}
