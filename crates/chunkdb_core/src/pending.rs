//! The pending-chunk table.
//!
//! A chunk enters the table when it is accepted for writing and leaves it
//! once its bytes have been flushed to the current file, where the
//! memory-mapped view can serve them. Until then, reads by reference are
//! answered from here. A failed write removes its entry straight away.

use crate::types::ChunkDiskMapperRef;
use chunkdb_codec::Chunk;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A chunk waiting to become readable from disk.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    /// The chunk.
    pub chunk: Arc<dyn Chunk>,
    /// Whether the chunk is written as out-of-order.
    pub out_of_order: bool,
}

/// Sharded map from reference to pending chunk.
#[derive(Debug)]
pub struct PendingChunks {
    shards: Vec<Mutex<HashMap<ChunkDiskMapperRef, PendingChunk>>>,
    len: AtomicUsize,
    peak: AtomicUsize,
    last_shrink: Mutex<Instant>,
    shrink_threshold: usize,
    shrink_interval: Duration,
}

impl PendingChunks {
    /// Creates a table with `shards` partitions.
    ///
    /// Once the table has held at least `shrink_threshold` entries and then
    /// drained, [`PendingChunks::maybe_shrink`] reallocates it at most once
    /// per `shrink_interval`.
    pub fn new(shards: usize, shrink_threshold: usize, shrink_interval: Duration) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            shards,
            len: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            last_shrink: Mutex::new(Instant::now()),
            shrink_threshold,
            shrink_interval,
        }
    }

    fn shard(&self, chunk_ref: ChunkDiskMapperRef) -> &Mutex<HashMap<ChunkDiskMapperRef, PendingChunk>> {
        let (seq, offset) = chunk_ref.unpack();
        let idx = ((seq ^ offset) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Adds a chunk.
    pub fn insert(&self, chunk_ref: ChunkDiskMapperRef, chunk: Arc<dyn Chunk>, out_of_order: bool) {
        let previous = self
            .shard(chunk_ref)
            .lock()
            .insert(chunk_ref, PendingChunk { chunk, out_of_order });
        if previous.is_none() {
            let len = self.len.fetch_add(1, Ordering::AcqRel) + 1;
            self.peak.fetch_max(len, Ordering::AcqRel);
        }
    }

    /// Looks up a chunk.
    pub fn get(&self, chunk_ref: ChunkDiskMapperRef) -> Option<PendingChunk> {
        self.shard(chunk_ref).lock().get(&chunk_ref).cloned()
    }

    /// Removes a chunk. Returns true if it was present.
    pub fn remove(&self, chunk_ref: ChunkDiskMapperRef) -> bool {
        let removed = self.shard(chunk_ref).lock().remove(&chunk_ref).is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Removes every listed chunk.
    pub fn remove_all(&self, refs: &[ChunkDiskMapperRef]) {
        for r in refs {
            self.remove(*r);
        }
    }

    /// Number of chunks in the table.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns true if the table holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest size reached since the last reallocation.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Reallocates the shards at half the peak size when the table is empty,
    /// the peak reached the threshold and the interval has elapsed since the
    /// last reallocation. Returns true if it did.
    pub fn maybe_shrink(&self) -> bool {
        if !self.is_empty() {
            return false;
        }
        let peak = self.peak();
        if peak < self.shrink_threshold {
            return false;
        }
        let mut last_shrink = self.last_shrink.lock();
        if last_shrink.elapsed() < self.shrink_interval {
            return false;
        }

        let mut guards: Vec<_> = self.shards.iter().map(|s| s.lock()).collect();
        if guards.iter().any(|g| !g.is_empty()) {
            return false;
        }
        let per_shard = peak / 2 / self.shards.len();
        for guard in &mut guards {
            **guard = HashMap::with_capacity(per_shard);
        }
        self.peak.store(0, Ordering::Release);
        *last_shrink = Instant::now();
        true
    }
}
