//! Asynchronous chunk writes.

use super::job_queue::JobQueue;
use crate::config::WriteQueueConfig;
use crate::error::{CoreError, CoreResult};
use crate::pending::{PendingChunk, PendingChunks};
use crate::stats::QueueStats;
use crate::types::{ChunkDiskMapperRef, SeriesRef};
use chunkdb_codec::Chunk;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Invoked once a chunk write has been attempted, with its outcome.
pub type WriteCallback = Box<dyn FnOnce(CoreResult<()>) + Send>;

/// Performs the physical write of a job.
pub type WriteFn = Box<dyn Fn(&WriteJob) -> CoreResult<()> + Send + Sync>;

/// Everything needed to write one chunk at a precomputed reference.
pub struct WriteJob {
    /// Where the chunk will live.
    pub chunk_ref: ChunkDiskMapperRef,
    /// Series the chunk belongs to.
    pub series_ref: SeriesRef,
    /// Lowest timestamp in the chunk.
    pub min_time: i64,
    /// Highest timestamp in the chunk.
    pub max_time: i64,
    /// The chunk.
    pub chunk: Arc<dyn Chunk>,
    /// Whether the chunk is out-of-order.
    pub out_of_order: bool,
    /// Whether a new file must be cut before writing.
    pub cut_file: bool,
    /// Completion callback.
    pub callback: Option<WriteCallback>,
}

impl fmt::Debug for WriteJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteJob")
            .field("chunk_ref", &self.chunk_ref)
            .field("series_ref", &self.series_ref)
            .field("min_time", &self.min_time)
            .field("max_time", &self.max_time)
            .field("out_of_order", &self.out_of_order)
            .field("cut_file", &self.cut_file)
            .finish_non_exhaustive()
    }
}

struct Shared {
    jobs: JobQueue<WriteJob>,
    pending: Arc<PendingChunks>,
    stats: Arc<QueueStats>,
    // Jobs accepted and not yet fully processed, including the one the
    // worker is writing.
    in_flight: AtomicUsize,
}

/// Queue of chunk writes drained by one worker thread.
///
/// Accepted chunks are recorded in the shared [`PendingChunks`] table before
/// they are queued, so they can be read back by reference while waiting.
/// The worker performs the write, invokes the job's callback and drops the
/// table entry if the write failed; successful entries are released by the
/// writer once the bytes reach the file.
pub struct ChunkWriteQueue {
    shared: Arc<Shared>,
    capacity: usize,
    running: Mutex<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ChunkWriteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkWriteQueue")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.shared.in_flight.load(Ordering::Acquire))
            .field("running", &*self.running.lock())
            .finish_non_exhaustive()
    }
}

impl ChunkWriteQueue {
    /// Starts a queue whose worker writes jobs with `write`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start(
        config: &WriteQueueConfig,
        pending: Arc<PendingChunks>,
        stats: Arc<QueueStats>,
        write: WriteFn,
    ) -> CoreResult<Self> {
        let capacity = config.capacity.max(1);
        let shared = Arc::new(Shared {
            jobs: JobQueue::new(capacity, config.segment_size()),
            pending,
            stats,
            in_flight: AtomicUsize::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("chunkdb-write-queue".into())
            .spawn(move || run_worker(&worker_shared, &write))?;
        debug!(capacity, "chunk write queue started");

        Ok(Self {
            shared,
            capacity,
            running: Mutex::new(true),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queues a job, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::QueueNotRunning`] after [`ChunkWriteQueue::stop`],
    /// or [`CoreError::QueueClosed`] if the queue closed while waiting.
    pub fn add_job(&self, job: WriteJob) -> CoreResult<()> {
        let running = self.running.lock();
        if !*running {
            return Err(CoreError::QueueNotRunning);
        }

        let chunk_ref = job.chunk_ref;
        self.shared
            .pending
            .insert(chunk_ref, Arc::clone(&job.chunk), job.out_of_order);
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);

        if !self.shared.jobs.push(job) {
            self.shared.pending.remove(chunk_ref);
            self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(CoreError::QueueClosed);
        }
        self.shared.stats.record_add();
        Ok(())
    }

    /// Returns the chunk for `chunk_ref` if it has not reached the file yet.
    pub fn get(&self, chunk_ref: ChunkDiskMapperRef) -> Option<PendingChunk> {
        let found = self.shared.pending.get(chunk_ref);
        if found.is_some() {
            self.shared.stats.record_get();
        }
        found
    }

    /// Returns true if no job is queued or being written.
    pub fn is_empty(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) == 0
    }

    /// Returns true if the queue is full and the worker is busy with one
    /// more job.
    pub fn is_full(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) == self.capacity + 1
    }

    /// Number of jobs queued or being written.
    pub fn len(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Stops accepting jobs, lets the worker finish every accepted job and
    /// waits for it to exit. Calling it again does nothing.
    pub fn stop(&self) {
        let mut running = self.running.lock();
        if !*running {
            return;
        }
        *running = false;
        self.shared.jobs.close();

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("chunk write queue worker panicked");
            }
        }
        debug!("chunk write queue stopped");
    }
}

impl Drop for ChunkWriteQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(shared: &Shared, write: &WriteFn) {
    while let Some(mut job) = shared.jobs.pop() {
        let result = write(&job);
        let failed = result.is_err();
        if let Some(callback) = job.callback.take() {
            callback(result);
        } else if let Err(err) = result {
            warn!(chunk_ref = %job.chunk_ref, error = %err, "chunk write failed");
        }

        if failed {
            shared.pending.remove(job.chunk_ref);
            shared.stats.record_failed();
        }
        shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        shared.stats.record_completed();

        if shared.pending.maybe_shrink() {
            shared.stats.record_shrink();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkdb_codec::RawChunk;
    use std::sync::mpsc;
    use std::time::Duration;

    fn job(offset: u64, callback: Option<WriteCallback>) -> WriteJob {
        WriteJob {
            chunk_ref: ChunkDiskMapperRef::new(1, offset),
            series_ref: SeriesRef::new(1),
            min_time: 0,
            max_time: 1,
            chunk: Arc::new(RawChunk::new(vec![offset as u8])),
            out_of_order: false,
            cut_file: false,
            callback,
        }
    }

    fn table() -> Arc<PendingChunks> {
        Arc::new(PendingChunks::new(4, 1000, Duration::from_secs(600)))
    }

    #[test]
    fn jobs_are_written_in_order() {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let queue = ChunkWriteQueue::start(
            &WriteQueueConfig::with_capacity(4),
            table(),
            Arc::new(QueueStats::new()),
            Box::new(move |job| {
                tx.lock().send(job.chunk_ref.offset()).unwrap();
                Ok(())
            }),
        )
        .unwrap();

        for offset in 0..20 {
            queue.add_job(job(offset, None)).unwrap();
        }
        queue.stop();

        let written: Vec<_> = rx.try_iter().collect();
        assert_eq!(written, (0..20).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn pending_until_released_or_failed() {
        let pending = table();
        let stats = Arc::new(QueueStats::new());
        let queue = ChunkWriteQueue::start(
            &WriteQueueConfig::with_capacity(4),
            Arc::clone(&pending),
            Arc::clone(&stats),
            Box::new(|job| {
                if job.chunk_ref.offset() == 2 {
                    Err(CoreError::invalid_operation("disk on fire"))
                } else {
                    Ok(())
                }
            }),
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        for offset in [1, 2] {
            let tx = tx.clone();
            let callback: WriteCallback = Box::new(move |res: CoreResult<()>| {
                tx.send((offset, res.is_ok())).unwrap();
            });
            queue.add_job(job(offset, Some(callback))).unwrap();
        }
        queue.stop();

        let outcomes: Vec<_> = rx.try_iter().collect();
        assert_eq!(outcomes, vec![(1, true), (2, false)]);

        // The successful write stays readable until the writer releases it.
        assert!(queue.get(ChunkDiskMapperRef::new(1, 1)).is_some());
        assert!(queue.get(ChunkDiskMapperRef::new(1, 2)).is_none());
        assert_eq!(stats.adds(), 2);
        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.gets(), 1);
    }

    #[test]
    fn add_after_stop_fails() {
        let pending = table();
        let queue = ChunkWriteQueue::start(
            &WriteQueueConfig::with_capacity(2),
            Arc::clone(&pending),
            Arc::new(QueueStats::new()),
            Box::new(|_| Ok(())),
        )
        .unwrap();
        queue.stop();
        queue.stop();

        assert!(matches!(
            queue.add_job(job(1, None)),
            Err(CoreError::QueueNotRunning)
        ));
        assert!(pending.is_empty());
    }

    #[test]
    fn full_queue_blocks_producer() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let queue = Arc::new(
            ChunkWriteQueue::start(
                &WriteQueueConfig::with_capacity(2),
                table(),
                Arc::new(QueueStats::new()),
                Box::new(move |_| {
                    release_rx.lock().recv().ok();
                    Ok(())
                }),
            )
            .unwrap(),
        );

        // One job in the worker, two in the queue.
        for offset in 0..3 {
            queue.add_job(job(offset, None)).unwrap();
        }
        for _ in 0..100 {
            if queue.is_full() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(queue.is_full());

        let (done_tx, done_rx) = mpsc::channel();
        let q = Arc::clone(&queue);
        let producer = std::thread::spawn(move || {
            q.add_job(job(3, None)).unwrap();
            done_tx.send(()).unwrap();
        });
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        release_tx.send(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();

        for _ in 0..3 {
            release_tx.send(()).unwrap();
        }
        queue.stop();
        assert!(queue.is_empty());
    }
}
