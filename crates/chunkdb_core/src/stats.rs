//! Write queue statistics.
//!
//! ```rust
//! use chunkdb_core::QueueStats;
//!
//! let stats = QueueStats::new();
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.adds, 0);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the chunk write queue.
///
/// All counters are atomic and can be read while the queue is running. Pass
/// an `Arc<QueueStats>` to
/// [`ChunkDiskMapper::open_with_stats`](crate::ChunkDiskMapper::open_with_stats)
/// to share it with a metrics exporter.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Jobs accepted by the queue.
    adds: AtomicU64,
    /// Reads served from the pending table.
    gets: AtomicU64,
    /// Jobs fully processed by the worker.
    completed: AtomicU64,
    /// Jobs whose physical write failed.
    failed: AtomicU64,
    /// Reallocations of the pending table.
    shrinks: AtomicU64,
}

impl QueueStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_add(&self) {
        self.adds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_shrink(&self) {
        self.shrinks.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of jobs accepted by the queue.
    pub fn adds(&self) -> u64 {
        self.adds.load(Ordering::Relaxed)
    }

    /// Returns the number of reads served from the pending table.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns the number of jobs processed by the worker.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Returns the number of jobs whose write failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Returns the number of pending table reallocations.
    pub fn shrinks(&self) -> u64 {
        self.shrinks.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            adds: self.adds(),
            gets: self.gets(),
            completed: self.completed(),
            failed: self.failed(),
            shrinks: self.shrinks(),
        }
    }
}

/// A point-in-time copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatsSnapshot {
    /// Jobs accepted by the queue.
    pub adds: u64,
    /// Reads served from the pending table.
    pub gets: u64,
    /// Jobs fully processed by the worker.
    pub completed: u64,
    /// Jobs whose physical write failed.
    pub failed: u64,
    /// Reallocations of the pending table.
    pub shrinks: u64,
}
