//! The chunk disk mapper: live, append-only chunk files.
//!
//! ## Layout
//!
//! ```text
//! <dir>/
//! ├─ 000001   finalized, truncated to its written size, mapped read-only
//! ├─ 000002   finalized
//! └─ 000003   current: preallocated to the max file size, appended to
//!             through a write buffer and mapped at full length
//! ```
//!
//! ## Write path
//!
//! [`ChunkDiskMapper::write_chunk`] assigns the reference under the cursor
//! lock before anything is written. The chunk is recorded in the pending
//! table and then either written synchronously or queued for the write
//! queue's worker. It stays in the pending table until the write buffer is
//! flushed into the file, from where the memory map serves it.
//!
//! ## Locks
//!
//! Three locks, always taken in this order:
//!
//! 1. cursor: reference assignment and cut decisions
//! 2. write path: the current file, its buffer and its size
//! 3. read path: the set of mapped files
//!
//! The read path lock is held exclusively only while the set of mapped files
//! changes or a map is replaced after truncating a finalized file.

mod cursor;

use self::cursor::Cursor;
use crate::config::MapperConfig;
use crate::error::{CoreError, CoreResult, CorruptionCause, CorruptionError};
use crate::format::{
    self, HEADER_SIZE, MAGIC_HEAD_CHUNKS, MAGIC_SIZE, MAX_LIVE_META_SIZE, MIN_LIVE_RECORD_SIZE,
};
use crate::framed::{FrameError, FrameReader};
use crate::pending::PendingChunks;
use crate::queue::{ChunkWriteQueue, WriteJob};
use crate::stats::QueueStats;
use crate::types::{ChunkDiskMapperRef, ChunkRecord, MappedChunk, SeriesRef};
use bytes::{BufMut, Bytes};
use chunkdb_codec::{sample_count, varint, Chunk, ChunkPool};
use chunkdb_storage::{
    cut_segment_file, dir_size, list_sequence_files, remove_temp_files, segment_file_path,
    sync_dir, truncate_file, ByteView, MappedFile,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stores chunks in live, append-only files and serves them back through
/// memory maps.
///
/// # Example
///
/// ```rust,no_run
/// use chunkdb_codec::{Chunk, DefaultPool, SampleChunk};
/// use chunkdb_core::{ChunkDiskMapper, MapperConfig, SeriesRef};
/// use std::sync::Arc;
///
/// let mapper = ChunkDiskMapper::open("data/chunks_head", Arc::new(DefaultPool), MapperConfig::default())?;
///
/// let mut chunk = SampleChunk::new();
/// chunk.append(1000, 1.0)?;
/// chunk.append(2000, 2.0)?;
///
/// let chunk_ref = mapper.write_chunk(SeriesRef::new(1), 1000, 2000, Arc::new(chunk), false, |res| {
///     if let Err(err) = res {
///         eprintln!("write failed: {err}");
///     }
/// })?;
///
/// let read = mapper.chunk(chunk_ref)?;
/// assert_eq!(read.chunk.num_samples(), 2);
/// mapper.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ChunkDiskMapper {
    inner: Arc<MapperInner>,
    cursor: Mutex<Cursor>,
    queue: Option<ChunkWriteQueue>,
}

impl std::fmt::Debug for ChunkDiskMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDiskMapper")
            .field("dir", &self.inner.dir)
            .field("config", &self.inner.config)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

struct MapperInner {
    dir: PathBuf,
    config: MapperConfig,
    pool: Arc<dyn ChunkPool>,
    pending: Arc<PendingChunks>,
    stats: Arc<QueueStats>,
    write: Mutex<WriteState>,
    read: RwLock<ReadState>,
    closed: AtomicBool,
    read_only: bool,
    // Bytes written to the current file, header included; 0 when no file is open.
    cur_file_size: AtomicU64,
}

#[derive(Default)]
struct WriteState {
    current: Option<CurrentFile>,
}

struct CurrentFile {
    seq: u64,
    path: PathBuf,
    file: File,
    buf: Vec<u8>,
    size: u64,
    max_time: Option<i64>,
    // Chunks in `buf`, released from the pending table on flush.
    unflushed: Vec<ChunkDiskMapperRef>,
}

impl CurrentFile {
    /// Writes the buffer to the file and releases its chunks from the
    /// pending table, shrinking the table if it drained.
    fn flush(&mut self, pending: &PendingChunks, stats: &QueueStats) -> CoreResult<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buf)?;
        self.buf.clear();
        pending.remove_all(&self.unflushed);
        self.unflushed.clear();
        if pending.maybe_shrink() {
            stats.record_shrink();
        }
        Ok(())
    }
}

#[derive(Default)]
struct ReadState {
    files: BTreeMap<u64, MappedSegment>,
    current_seq: u64,
    max_times_established: bool,
}

struct MappedSegment {
    map: Arc<MappedFile>,
    max_time: Option<i64>,
}

fn merge_max(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

impl ChunkDiskMapper {
    /// Opens the chunk files in `dir`, creating the directory if needed.
    ///
    /// Leftovers of an interrupted cut are removed first. The remaining files
    /// must form a gap-free sequence with valid headers.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsequentialFiles`] for gaps, a corruption error
    /// for bad headers, or an I/O error.
    pub fn open(
        dir: impl AsRef<Path>,
        pool: Arc<dyn ChunkPool>,
        config: MapperConfig,
    ) -> CoreResult<Self> {
        Self::open_with_stats(dir, pool, config, Arc::new(QueueStats::new()))
    }

    /// Like [`ChunkDiskMapper::open`], recording write queue activity in
    /// `stats`.
    ///
    /// # Errors
    ///
    /// See [`ChunkDiskMapper::open`].
    pub fn open_with_stats(
        dir: impl AsRef<Path>,
        pool: Arc<dyn ChunkPool>,
        config: MapperConfig,
        stats: Arc<QueueStats>,
    ) -> CoreResult<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let removed = remove_temp_files(&dir)?;
        if removed > 0 {
            warn!(dir = %dir.display(), removed, "removed temporary files from an interrupted cut");
        }

        let mut files = list_sequence_files(&dir)?;
        if let Some(seq) = incomplete_last_file(&files)? {
            if let Some(path) = files.remove(&seq) {
                warn!(path = %path.display(), seq, "deleting incomplete last chunk file");
                fs::remove_file(path)?;
            }
        }
        Self::from_files(dir, files, pool, config, stats, false)
    }

    /// Opens the chunk files in `dir` for reading only, changing nothing on
    /// disk.
    ///
    /// The directory must exist. Leftovers of an interrupted cut are left in
    /// place and an incomplete last file is skipped rather than deleted.
    /// Writes, cuts and deletions fail with [`CoreError::InvalidOperation`].
    ///
    /// # Errors
    ///
    /// See [`ChunkDiskMapper::open`]. A missing directory is an I/O error.
    pub fn open_read_only(
        dir: impl AsRef<Path>,
        pool: Arc<dyn ChunkPool>,
        config: MapperConfig,
    ) -> CoreResult<Self> {
        let config = config.write_queue_size(0);
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();

        let mut files = list_sequence_files(&dir)?;
        if let Some(seq) = incomplete_last_file(&files)? {
            debug!(dir = %dir.display(), seq, "skipping incomplete last chunk file");
            files.remove(&seq);
        }
        Self::from_files(dir, files, pool, config, Arc::new(QueueStats::new()), true)
    }

    fn from_files(
        dir: PathBuf,
        files: BTreeMap<u64, PathBuf>,
        pool: Arc<dyn ChunkPool>,
        config: MapperConfig,
        stats: Arc<QueueStats>,
        read_only: bool,
    ) -> CoreResult<Self> {
        let mapped = map_files(&dir, &files)?;
        let last_seq = mapped.keys().next_back().copied().unwrap_or(0);
        debug!(dir = %dir.display(), files = mapped.len(), last_seq, read_only, "opened chunk files");

        let pending = Arc::new(PendingChunks::new(
            config.pending_shards,
            config.queue.shrink_threshold,
            config.queue.shrink_interval,
        ));
        let write_queue_size = config.write_queue_size;
        let queue_config = config.queue.clone().capacity(write_queue_size);

        let inner = Arc::new(MapperInner {
            dir,
            config,
            pool,
            pending: Arc::clone(&pending),
            stats: Arc::clone(&stats),
            write: Mutex::new(WriteState::default()),
            read: RwLock::new(ReadState {
                files: mapped,
                current_seq: 0,
                max_times_established: false,
            }),
            closed: AtomicBool::new(false),
            read_only,
            cur_file_size: AtomicU64::new(0),
        });

        let queue = if write_queue_size > 0 {
            let worker_inner = Arc::clone(&inner);
            Some(ChunkWriteQueue::start(
                &queue_config,
                pending,
                stats,
                Box::new(move |job| worker_inner.write_job(job)),
            )?)
        } else {
            None
        };

        Ok(Self {
            inner,
            cursor: Mutex::new(Cursor::at_seq(last_seq)),
            queue,
        })
    }

    /// Returns the directory holding the chunk files.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Returns the write queue statistics.
    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.inner.stats
    }

    /// Writes a chunk and returns its reference.
    ///
    /// The reference is assigned before the chunk is written and can be read
    /// back immediately. Without a write queue the chunk is written before
    /// this returns; with one it is queued, blocking while the queue is full.
    /// `callback` receives the outcome of the physical write either way. In
    /// the synchronous case it runs while the cursor lock is held and must
    /// not write to this mapper.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MapperClosed`] after [`ChunkDiskMapper::close`],
    /// a queue error if the chunk could not be queued, or
    /// [`CoreError::InvalidOperation`] for a zero series reference or a
    /// chunk that cannot fit in a file.
    /// Write errors go to `callback`.
    pub fn write_chunk<F>(
        &self,
        series_ref: SeriesRef,
        min_time: i64,
        max_time: i64,
        chunk: Arc<dyn Chunk>,
        out_of_order: bool,
        callback: F,
    ) -> CoreResult<ChunkDiskMapperRef>
    where
        F: FnOnce(CoreResult<()>) + Send + 'static,
    {
        self.inner.check_writable()?;
        if series_ref.as_u64() == 0 {
            // A zero series reads back as the unwritten tail of the file.
            return Err(CoreError::invalid_operation("series reference must not be zero"));
        }
        let encoding = chunk.encoding();
        if !encoding.is_valid() {
            return Err(CoreError::invalid_operation(format!(
                "encoding {encoding} uses the reserved out-of-order bit"
            )));
        }
        let data_len = chunk.bytes().len();
        let record_size = format::live_record_size(data_len);
        let max_file_size = self.inner.config.max_file_size;
        if u32::try_from(data_len).is_err() || HEADER_SIZE as u64 + record_size > max_file_size {
            return Err(CoreError::invalid_operation(format!(
                "chunk of {data_len} bytes does not fit in a file of {max_file_size} bytes"
            )));
        }

        let mut cursor = self.cursor.lock();
        if self.inner.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        let (chunk_ref, cut_file) = cursor.next_ref(record_size, max_file_size);

        let job = WriteJob {
            chunk_ref,
            series_ref,
            min_time,
            max_time,
            chunk,
            out_of_order,
            cut_file,
            callback: Some(Box::new(callback)),
        };
        match &self.queue {
            Some(queue) => queue.add_job(job)?,
            None => self.inner.write_sync(job),
        }
        Ok(chunk_ref)
    }

    /// Reads a chunk back by reference.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MapperClosed`] after close, or a corruption error
    /// carrying the file index if the record is missing, truncated, fails its
    /// checksum or cannot be decoded.
    pub fn chunk(&self, chunk_ref: ChunkDiskMapperRef) -> CoreResult<MappedChunk> {
        if self.inner.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        let pending = match &self.queue {
            Some(queue) => queue.get(chunk_ref),
            None => self.inner.pending.get(chunk_ref),
        };
        if let Some(pending) = pending {
            return Ok(MappedChunk {
                chunk: pending.chunk,
                out_of_order: pending.out_of_order,
            });
        }
        self.inner.read_chunk(chunk_ref)
    }

    /// Visits every chunk on disk, ascending by file and offset.
    ///
    /// Stops at the unwritten tail of each file. Records the maximum
    /// timestamp of every file visited, see [`ChunkDiskMapper::file_max_time`].
    /// Corruption errors returned by `visitor` are attributed to the file
    /// being iterated.
    ///
    /// # Errors
    ///
    /// Returns the first corruption found or the first error from `visitor`.
    pub fn iterate_all_chunks<F>(&self, visitor: F) -> CoreResult<()>
    where
        F: FnMut(&ChunkRecord) -> CoreResult<()>,
    {
        self.inner.iterate_all_chunks(visitor)
    }

    /// Deletes every file with a sequence number below `below_seq`.
    ///
    /// The current file is never deleted; if it holds chunks, the next chunk
    /// goes to a new file so a later truncation can remove it. If every file
    /// was deleted and no write is queued, sequence numbers restart from 1.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MapperClosed`] after close, or the first error
    /// hit while deleting.
    pub fn truncate(&self, below_seq: u64) -> CoreResult<()> {
        if self.inner.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        self.inner.check_writable()?;

        let (all, removed) = {
            let rs = self.inner.read.read();
            let removed: Vec<u64> = rs
                .files
                .keys()
                .copied()
                .take_while(|seq| *seq != rs.current_seq && *seq < below_seq)
                .collect();
            (rs.files.len(), removed)
        };

        if self.inner.cur_file_size.load(Ordering::Acquire) > HEADER_SIZE as u64 {
            // Racing writers may cut first, leaving an empty file behind.
            self.cut_new_file()?;
        }

        let (undeleted, result) = self.inner.delete_files(&removed);
        info!(dir = %self.inner.dir.display(), below_seq, deleted = removed.len() - undeleted.len(), "truncated chunk files");

        if all == removed.len() {
            let mut cursor = self.cursor.lock();
            // A queued job may still cut a file under a sequence number
            // assigned before the reset.
            if self.is_queue_empty() {
                match undeleted.last() {
                    Some(seq) if result.is_err() => cursor.set_seq(*seq),
                    _ => cursor.set_seq(0),
                }
            }
        }
        result
    }

    /// Deletes the file named by a corruption error and every later file,
    /// so writing resumes right after the last intact file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `err` is not a corruption
    /// error with a file index, or the first error hit while deleting.
    pub fn delete_corrupted(&self, err: &CoreError) -> CoreResult<()> {
        self.inner.check_writable()?;
        let Some(corruption) = err.as_corruption() else {
            return Err(CoreError::invalid_operation(format!("cannot handle error: {err}")));
        };
        let Some(first_bad) = corruption.file_index else {
            return Err(CoreError::invalid_operation(format!(
                "corruption is not attributed to a file: {err}"
            )));
        };

        let mut cursor = self.cursor.lock();
        if self.inner.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        self.inner.abandon_current_from(first_bad);

        let (segs, last_good) = {
            let rs = self.inner.read.read();
            let segs: Vec<u64> = rs.files.range(first_bad..).map(|(seq, _)| *seq).collect();
            let last_good = rs.files.range(..first_bad).next_back().map_or(0, |(seq, _)| *seq);
            (segs, last_good)
        };

        let (undeleted, result) = self.inner.delete_files(&segs);
        match undeleted.last() {
            Some(seq) if result.is_err() => cursor.set_seq(*seq),
            _ => cursor.set_seq(last_good),
        }
        info!(
            dir = %self.inner.dir.display(),
            first_bad,
            deleted = segs.len() - undeleted.len(),
            "deleted corrupted chunk files"
        );
        result
    }

    /// Makes the next chunk go to a new file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MapperClosed`] after close.
    pub fn cut_new_file(&self) -> CoreResult<()> {
        let mut cursor = self.cursor.lock();
        if self.inner.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        self.inner.check_writable()?;
        cursor.request_cut();
        Ok(())
    }

    /// Returns true if no write is queued or in progress. Always true without
    /// a write queue.
    pub fn is_queue_empty(&self) -> bool {
        self.queue.as_ref().map_or(true, ChunkWriteQueue::is_empty)
    }

    /// Returns the combined size of the chunk files in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MapperClosed`] after close, or an I/O error.
    pub fn size(&self) -> CoreResult<u64> {
        if self.inner.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        Ok(dir_size(&self.inner.dir)?)
    }

    /// Returns the sequence numbers of the files on disk, ascending.
    pub fn file_sequences(&self) -> Vec<u64> {
        self.inner.read.read().files.keys().copied().collect()
    }

    /// Returns the highest chunk timestamp seen in file `seq`.
    ///
    /// Known for files written by this process and, once
    /// [`ChunkDiskMapper::iterate_all_chunks`] has run, for files found at
    /// open.
    pub fn file_max_time(&self, seq: u64) -> Option<i64> {
        let ws = self.inner.write.lock();
        if let Some(cur) = ws.current.as_ref().filter(|c| c.seq == seq) {
            return cur.max_time;
        }
        let rs = self.inner.read.read();
        rs.files.get(&seq).and_then(|s| s.max_time)
    }

    /// Returns true once [`ChunkDiskMapper::iterate_all_chunks`] has run.
    pub fn max_times_established(&self) -> bool {
        self.inner.read.read().max_times_established
    }

    /// Drains the write queue, finalizes the current file and releases every
    /// map. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if finalizing the current file fails. The mapper is
    /// closed regardless.
    pub fn close(&self) -> CoreResult<()> {
        let _cursor = self.cursor.lock();
        if let Some(queue) = &self.queue {
            queue.stop();
        }

        let mut ws = self.inner.write.lock();
        if self.inner.is_closed() {
            return Ok(());
        }
        let result = self.inner.finalize_current(&mut ws);
        ws.current = None;
        self.inner.cur_file_size.store(0, Ordering::Release);

        let mut rs = self.inner.read.write();
        self.inner.closed.store(true, Ordering::Release);
        rs.files.clear();
        info!(dir = %self.inner.dir.display(), "chunk disk mapper closed");
        result
    }
}

impl Drop for ChunkDiskMapper {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(dir = %self.inner.dir.display(), error = %err, "closing chunk disk mapper failed");
        }
    }
}

impl MapperInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_writable(&self) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::invalid_operation("chunk files were opened read-only"));
        }
        Ok(())
    }

    fn corruption(&self, seq: u64, cause: CorruptionCause) -> CoreError {
        CorruptionError::new(&self.dir, Some(seq), cause).into()
    }

    fn write_sync(&self, mut job: WriteJob) {
        self.pending
            .insert(job.chunk_ref, Arc::clone(&job.chunk), job.out_of_order);
        let result = self.write_job(&job);
        if result.is_err() {
            self.pending.remove(job.chunk_ref);
        }
        if let Some(callback) = job.callback.take() {
            callback(result);
        }
    }

    fn write_job(&self, job: &WriteJob) -> CoreResult<()> {
        let mut ws = self.write.lock();
        if self.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        if job.cut_file {
            self.cut(&mut ws, job.chunk_ref)?;
        }
        self.write_record(&mut ws, job)
    }

    fn write_record(&self, ws: &mut WriteState, job: &WriteJob) -> CoreResult<()> {
        let cur = ws
            .current
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("no chunk file open for writing"))?;
        if job.chunk_ref.unpack() != (cur.seq, cur.size) {
            return Err(CoreError::invalid_operation(format!(
                "chunk reference {} does not match write position {}:{}",
                job.chunk_ref, cur.seq, cur.size
            )));
        }

        let data = job.chunk.bytes();
        let buffer_size = self.config.write_buffer_size;
        if cur.buf.len() + MAX_LIVE_META_SIZE + data.len() > buffer_size {
            cur.flush(&self.pending, &self.stats)?;
        }

        let start = cur.buf.len();
        cur.buf.put_u64(job.series_ref.as_u64());
        cur.buf.put_i64(job.min_time);
        cur.buf.put_i64(job.max_time);
        cur.buf.put_u8(format::pack_encoding(job.chunk.encoding(), job.out_of_order));
        varint::put_uvarint(&mut cur.buf, data.len() as u64);
        cur.buf.put_slice(data);
        let crc = self.config.checksum.checksum(&cur.buf[start..]);
        cur.buf.put_u32(crc);

        cur.size += (cur.buf.len() - start) as u64;
        cur.max_time = merge_max(cur.max_time, Some(job.max_time));
        cur.unflushed.push(job.chunk_ref);
        self.cur_file_size.store(cur.size, Ordering::Release);

        // Large chunks go straight to the file.
        if data.len() + MAX_LIVE_META_SIZE >= buffer_size {
            cur.flush(&self.pending, &self.stats)?;
        }
        Ok(())
    }

    /// Finalizes the current file and starts a new one, which must begin at
    /// `expected`.
    fn cut(&self, ws: &mut WriteState, expected: ChunkDiskMapperRef) -> CoreResult<()> {
        self.finalize_current(ws)?;
        ws.current = None;

        let header = format::header(MAGIC_HEAD_CHUNKS);
        let cut = cut_segment_file(&self.dir, &header, self.config.max_file_size)?;
        let map = Arc::new(MappedFile::from_file(&cut.path, &cut.file)?);
        {
            let mut rs = self.read.write();
            rs.files.insert(
                cut.seq,
                MappedSegment {
                    map,
                    max_time: None,
                },
            );
            rs.current_seq = cut.seq;
        }
        debug!(dir = %self.dir.display(), seq = cut.seq, "cut new chunk file");

        let (seq, offset) = (cut.seq, cut.header_len);
        self.cur_file_size.store(offset, Ordering::Release);
        ws.current = Some(CurrentFile {
            seq,
            path: cut.path,
            file: cut.file,
            buf: Vec::with_capacity(self.config.write_buffer_size),
            size: offset,
            max_time: None,
            unflushed: Vec::new(),
        });

        if expected.unpack() != (seq, offset) {
            return Err(CoreError::CutMismatch {
                expected_seq: expected.seq(),
                expected_offset: expected.offset(),
                actual_seq: seq,
                actual_offset: offset,
            });
        }
        Ok(())
    }

    /// Flushes the current file, truncates its preallocated tail and remaps
    /// it at its final size. Leaves the file in place on error.
    fn finalize_current(&self, ws: &mut WriteState) -> CoreResult<()> {
        let Some(cur) = ws.current.as_mut() else {
            return Ok(());
        };
        cur.flush(&self.pending, &self.stats)?;

        let mut rs = self.read.write();
        truncate_file(&cur.file, cur.size)?;
        let map = Arc::new(MappedFile::from_file(&cur.path, &cur.file)?);
        let max_time = merge_max(rs.files.get(&cur.seq).and_then(|s| s.max_time), cur.max_time);
        rs.files.insert(cur.seq, MappedSegment { map, max_time });
        drop(rs);

        debug!(dir = %self.dir.display(), seq = cur.seq, size = cur.size, "finalized chunk file");
        ws.current = None;
        self.cur_file_size.store(0, Ordering::Release);
        Ok(())
    }

    /// Drops the current file without finalizing it if its sequence is at or
    /// after `first_bad`.
    fn abandon_current_from(&self, first_bad: u64) {
        let mut ws = self.write.lock();
        if ws.current.as_ref().map_or(false, |c| c.seq >= first_bad) {
            if let Some(cur) = ws.current.take() {
                self.pending.remove_all(&cur.unflushed);
            }
            self.cur_file_size.store(0, Ordering::Release);
        }
    }

    fn read_chunk(&self, chunk_ref: ChunkDiskMapperRef) -> CoreResult<MappedChunk> {
        let (seq, offset) = chunk_ref.unpack();
        let (encoding, out_of_order, data) = {
            let rs = self.read.read();
            if self.is_closed() {
                return Err(CoreError::MapperClosed);
            }
            let Some(segment) = rs.files.get(&seq) else {
                // References past the current file were never handed out by
                // this process and cannot be attributed to a file.
                let file_index = (seq <= rs.current_seq).then_some(seq);
                return Err(CorruptionError::new(
                    &self.dir,
                    file_index,
                    CorruptionCause::MissingFile { seq },
                )
                .into());
            };

            let reader = FrameReader::new(&*segment.map, self.config.checksum);
            let record = reader
                .live_record(offset as usize)
                .map_err(|err| self.corruption(seq, err.into()))?;
            (
                record.encoding,
                record.out_of_order,
                Bytes::copy_from_slice(record.data),
            )
        };

        let chunk = self
            .pool
            .get(encoding, data)
            .map_err(|err| self.corruption(seq, CorruptionCause::Decode(err)))?;
        Ok(MappedChunk {
            chunk,
            out_of_order,
        })
    }

    fn iterate_all_chunks<F>(&self, mut visitor: F) -> CoreResult<()>
    where
        F: FnMut(&ChunkRecord) -> CoreResult<()>,
    {
        let mut ws = self.write.lock();
        if self.is_closed() {
            return Err(CoreError::MapperClosed);
        }
        if let Some(cur) = ws.current.as_mut() {
            cur.flush(&self.pending, &self.stats)?;
        }
        let current = ws.current.as_ref().map(|c| (c.seq, c.size));

        let files: Vec<(u64, Arc<MappedFile>)> = self
            .read
            .read()
            .files
            .iter()
            .map(|(seq, s)| (*seq, Arc::clone(&s.map)))
            .collect();

        let mut result = Ok(());
        for (seq, map) in &files {
            let file_end = match current {
                Some((cur_seq, size)) if cur_seq == *seq => size as usize,
                _ => map.len(),
            };
            let max_time = match self.iterate_file(*seq, map, file_end, &mut visitor) {
                Ok(max_time) => max_time,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            };

            if let Some(cur) = ws.current.as_mut().filter(|c| c.seq == *seq) {
                cur.max_time = merge_max(cur.max_time, max_time);
            }
            if let Some(segment) = self.read.write().files.get_mut(seq) {
                segment.max_time = merge_max(segment.max_time, max_time);
            }
        }

        self.read.write().max_times_established = true;
        result
    }

    /// Visits the records of one file. Returns the highest max time seen.
    fn iterate_file<F>(
        &self,
        seq: u64,
        map: &MappedFile,
        file_end: usize,
        visitor: &mut F,
    ) -> CoreResult<Option<i64>>
    where
        F: FnMut(&ChunkRecord) -> CoreResult<()>,
    {
        let reader = FrameReader::new(map, self.config.checksum);
        let corrupt = |err: FrameError| self.corruption(seq, err.into());
        let mut offset = HEADER_SIZE;
        let mut max_time = None;

        while offset < file_end {
            if file_end - offset < MIN_LIVE_RECORD_SIZE {
                if reader.is_zeroed(offset, file_end).map_err(corrupt)? {
                    break;
                }
                return Err(self.corruption(
                    seq,
                    CorruptionCause::ShortRead {
                        offset: offset as u64,
                        required: (offset + MIN_LIVE_RECORD_SIZE) as u64,
                        available: file_end as u64,
                    },
                ));
            }

            let head = reader.live_head(offset).map_err(corrupt)?;
            if head.is_unwritten() {
                break;
            }
            let record = reader.live_record(offset).map_err(corrupt)?;
            if record.end > file_end {
                return Err(self.corruption(
                    seq,
                    CorruptionCause::ShortRead {
                        offset: offset as u64,
                        required: record.end as u64,
                        available: file_end as u64,
                    },
                ));
            }

            max_time = merge_max(max_time, Some(head.max_time));
            let info = ChunkRecord {
                series_ref: head.series_ref,
                chunk_ref: ChunkDiskMapperRef::new(seq, offset as u64),
                min_time: head.min_time,
                max_time: head.max_time,
                num_samples: sample_count(record.encoding, record.data),
                encoding: record.encoding,
                out_of_order: record.out_of_order,
            };
            visitor(&info).map_err(|err| match err {
                CoreError::Corruption(mut c) => {
                    c.dir = self.dir.clone();
                    c.file_index = Some(seq);
                    CoreError::Corruption(c)
                }
                other => other,
            })?;
            offset = record.end;
        }
        Ok(max_time)
    }

    /// Unmaps and deletes the given files in order.
    ///
    /// Returns the files left on disk if a deletion failed, with the error.
    fn delete_files(&self, seqs: &[u64]) -> (Vec<u64>, CoreResult<()>) {
        if seqs.is_empty() {
            return (Vec::new(), Ok(()));
        }
        {
            let mut rs = self.read.write();
            for seq in seqs {
                rs.files.remove(seq);
                if rs.current_seq == *seq {
                    rs.current_seq = 0;
                }
            }
        }

        for (i, seq) in seqs.iter().enumerate() {
            if let Err(err) = fs::remove_file(segment_file_path(&self.dir, *seq)) {
                return (seqs[i..].to_vec(), Err(err.into()));
            }
        }
        match sync_dir(&self.dir) {
            Ok(()) => (Vec::new(), Ok(())),
            Err(err) => (Vec::new(), Err(err.into())),
        }
    }
}

/// Returns the last file's sequence number if a crash left it without a
/// complete magic number.
fn incomplete_last_file(files: &BTreeMap<u64, PathBuf>) -> CoreResult<Option<u64>> {
    let Some((&seq, path)) = files.iter().next_back() else {
        return Ok(None);
    };

    let mut magic = Vec::with_capacity(MAGIC_SIZE);
    File::open(path)?
        .take(MAGIC_SIZE as u64)
        .read_to_end(&mut magic)?;
    let zeroed = magic.iter().all(|b| *b == 0);
    Ok((magic.len() < MAGIC_SIZE || zeroed).then_some(seq))
}

/// Maps every file, checking the sequence has no gaps and every header is
/// valid.
fn map_files(dir: &Path, files: &BTreeMap<u64, PathBuf>) -> CoreResult<BTreeMap<u64, MappedSegment>> {
    let mut prev: Option<u64> = None;
    for seq in files.keys() {
        if let Some(p) = prev {
            if *seq != p + 1 {
                return Err(CoreError::UnsequentialFiles {
                    previous: p,
                    next: *seq,
                });
            }
        }
        prev = Some(*seq);
    }

    let mut mapped = BTreeMap::new();
    for (seq, path) in files {
        let map = MappedFile::open(path)?;
        format::check_header(map.as_slice(), MAGIC_HEAD_CHUNKS)
            .map_err(|cause| CorruptionError::new(dir, Some(*seq), cause))?;
        mapped.insert(
            *seq,
            MappedSegment {
                map: Arc::new(map),
                max_time: None,
            },
        );
    }
    Ok(mapped)
}

/// Deletes the chunk files in `dir` from sequence `first_seq` on, without
/// opening a mapper. Used to recover from corruption that prevents
/// [`ChunkDiskMapper::open`] from succeeding.
///
/// Returns the deleted sequence numbers.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or a file cannot be
/// removed.
pub fn remove_files_from(dir: &Path, first_seq: u64) -> CoreResult<Vec<u64>> {
    let files = list_sequence_files(dir)?;
    let mut removed = Vec::new();
    for (seq, path) in files.range(first_seq..) {
        fs::remove_file(path)?;
        removed.push(*seq);
    }
    if !removed.is_empty() {
        sync_dir(dir)?;
        info!(dir = %dir.display(), first_seq, removed = removed.len(), "removed chunk files");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkdb_codec::{DefaultPool, Encoding, RawChunk, Sample, SampleChunk};
    use std::sync::mpsc;
    use tempfile::tempdir;

    const SMALL_FILE: u64 = 1024;
    const BUFFER: usize = 64 * 1024;

    fn config() -> MapperConfig {
        MapperConfig::new()
            .max_file_size(SMALL_FILE)
            .write_buffer_size(BUFFER)
            .pending_shards(4)
    }

    fn open(dir: &Path, config: MapperConfig) -> ChunkDiskMapper {
        ChunkDiskMapper::open(dir, Arc::new(DefaultPool), config).unwrap()
    }

    fn raw(len: usize, fill: u8) -> Arc<dyn Chunk> {
        Arc::new(RawChunk::new(vec![fill; len]))
    }

    fn write(mapper: &ChunkDiskMapper, series: u64, t: i64, chunk: Arc<dyn Chunk>) -> ChunkDiskMapperRef {
        let (tx, rx) = mpsc::channel();
        let r = mapper
            .write_chunk(SeriesRef::new(series), t, t + 10, chunk, false, move |res| {
                tx.send(res.is_ok()).unwrap();
            })
            .unwrap();
        if mapper.queue.is_none() {
            assert!(rx.try_recv().unwrap());
        }
        r
    }

    #[test]
    fn write_then_read_before_and_after_flush() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        let chunk = Arc::new(SampleChunk::from_samples(&[Sample::new(1, 1.0), Sample::new(2, 2.0)]).unwrap());

        let r = write(&mapper, 1, 1, chunk);
        assert_eq!(r.unpack(), (1, HEADER_SIZE as u64));

        // Still buffered: served from the pending table.
        assert_eq!(mapper.inner.pending.len(), 1);
        assert_eq!(mapper.chunk(r).unwrap().chunk.num_samples(), 2);

        mapper.cut_new_file().unwrap();
        write(&mapper, 1, 100, raw(4, 1));
        assert!(mapper.inner.pending.get(r).is_none());

        let read = mapper.chunk(r).unwrap();
        assert_eq!(read.chunk.encoding(), Encoding::DELTA);
        assert_eq!(read.chunk.samples().unwrap()[1], Sample::new(2, 2.0));
        assert!(!read.out_of_order);
    }

    #[test]
    fn refs_increase_and_files_are_cut_by_size() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());

        let mut refs = Vec::new();
        for i in 0..20 {
            refs.push(write(&mapper, 1, i * 100, raw(100, i as u8)));
        }
        assert!(refs.windows(2).all(|w| w[0] < w[1]));
        // 130-byte records, 7 per 1 KiB file.
        assert_eq!(refs[6].seq(), 1);
        assert_eq!(refs[7].unpack(), (2, HEADER_SIZE as u64));
        assert_eq!(mapper.file_sequences(), vec![1, 2, 3]);

        for (i, r) in refs.iter().enumerate() {
            assert_eq!(mapper.chunk(*r).unwrap().chunk.bytes(), vec![i as u8; 100]);
        }

        // Finalized files are truncated to their written size.
        let len = fs::metadata(segment_file_path(dir.path(), 1)).unwrap().len();
        assert_eq!(len, HEADER_SIZE as u64 + 7 * 130);
    }

    #[test]
    fn large_chunk_flushes_immediately() {
        let dir = tempdir().unwrap();
        let mapper = open(
            dir.path(),
            config().max_file_size(1 << 20),
        );
        let r = write(&mapper, 1, 0, raw(BUFFER, 7));
        assert!(mapper.inner.pending.is_empty());
        assert_eq!(mapper.chunk(r).unwrap().chunk.bytes().len(), BUFFER);
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        let err = mapper
            .write_chunk(SeriesRef::new(1), 0, 1, raw(2048, 0), false, |_| {})
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn zero_series_is_rejected() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        let err = mapper
            .write_chunk(SeriesRef::new(0), 0, 0, raw(8, 1), false, |_| {})
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        let r = write(&mapper, 5, 10, raw(8, 2));
        assert_eq!(r.unpack(), (1, HEADER_SIZE as u64));
        let records = {
            let mut records = Vec::new();
            mapper
                .iterate_all_chunks(|record| {
                    records.push(record.series_ref);
                    Ok(())
                })
                .unwrap();
            records
        };
        assert_eq!(records, vec![SeriesRef::new(5)]);
    }

    #[test]
    fn drained_pending_table_shrinks_after_flush() {
        use crate::config::WriteQueueConfig;
        use std::time::Duration;

        let dir = tempdir().unwrap();
        let mapper = open(
            dir.path(),
            config()
                .max_file_size(1 << 20)
                .queue(
                    WriteQueueConfig::default()
                        .shrink_threshold(4)
                        .shrink_interval(Duration::ZERO),
                )
                .write_queue_size(8),
        );

        let mut t = 0;
        for _ in 0..5 {
            for _ in 0..200 {
                write(&mapper, 1, t, raw(8, 3));
                t += 20;
            }
            for _ in 0..500 {
                if mapper.is_queue_empty() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            assert!(mapper.is_queue_empty());
            // Iterating flushes the buffer, releasing every pending entry.
            mapper.iterate_all_chunks(|_| Ok(())).unwrap();
            assert!(mapper.inner.pending.is_empty());
        }
        assert!(mapper.stats().shrinks() > 0);
        mapper.close().unwrap();
    }

    #[test]
    fn read_only_open_leaves_directory_untouched() {
        let dir = tempdir().unwrap();
        {
            let mapper = open(dir.path(), config());
            write(&mapper, 1, 0, raw(16, 1));
            mapper.close().unwrap();
        }
        fs::write(segment_file_path(dir.path(), 2), [0x01, 0x30]).unwrap();
        let tmp = dir.path().join("000003.tmp");
        fs::write(&tmp, b"partial").unwrap();

        let mapper = ChunkDiskMapper::open_read_only(dir.path(), Arc::new(DefaultPool), config()).unwrap();
        assert_eq!(mapper.file_sequences(), vec![1]);
        let mut count = 0;
        mapper
            .iterate_all_chunks(|_| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);

        let err = mapper
            .write_chunk(SeriesRef::new(1), 0, 1, raw(8, 0), false, |_| {})
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert!(mapper.cut_new_file().is_err());
        assert!(mapper.truncate(2).is_err());
        mapper.close().unwrap();

        assert_eq!(fs::metadata(segment_file_path(dir.path(), 2)).unwrap().len(), 2);
        assert!(tmp.exists());

        let missing = dir.path().join("missing");
        assert!(ChunkDiskMapper::open_read_only(&missing, Arc::new(DefaultPool), config()).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn reopen_and_iterate() {
        let dir = tempdir().unwrap();
        let mut written = Vec::new();
        {
            let mapper = open(dir.path(), config());
            for i in 0..10i64 {
                let chunk = Arc::new(SampleChunk::from_samples(&[Sample::new(i, 0.0), Sample::new(i + 1, 0.0)]).unwrap());
                let r = mapper
                    .write_chunk(SeriesRef::new(i as u64 + 1), i, i * 10, chunk, i % 3 == 0, |_| {})
                    .unwrap();
                written.push((r, i));
            }
            mapper.close().unwrap();
        }

        let mapper = open(dir.path(), config());
        assert!(!mapper.max_times_established());
        assert_eq!(mapper.file_max_time(1), None);

        let mut seen = Vec::new();
        mapper
            .iterate_all_chunks(|rec| {
                seen.push(*rec);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen.len(), 10);
        for (rec, (r, i)) in seen.iter().zip(&written) {
            assert_eq!(rec.chunk_ref, *r);
            assert_eq!(rec.series_ref, SeriesRef::new(*i as u64 + 1));
            assert_eq!(rec.min_time, *i);
            assert_eq!(rec.max_time, i * 10);
            assert_eq!(rec.num_samples, 2);
            assert_eq!(rec.encoding, Encoding::DELTA);
            assert_eq!(rec.out_of_order, i % 3 == 0);
        }
        assert!(mapper.max_times_established());
        let last = written.last().unwrap().0.seq();
        assert_eq!(mapper.file_max_time(last), Some(90));

        // New writes go to a fresh file.
        let r = write(&mapper, 1, 1000, raw(1, 0));
        assert_eq!(r.seq(), last + 1);
    }

    #[test]
    fn iterate_includes_buffered_current_file() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        write(&mapper, 1, 0, raw(10, 1));
        write(&mapper, 2, 5, raw(10, 2));

        let mut count = 0;
        mapper
            .iterate_all_chunks(|_| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(mapper.file_max_time(1), Some(15));
    }

    #[test]
    fn visitor_corruption_is_attributed_to_file() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        write(&mapper, 1, 0, raw(10, 1));

        let err = mapper
            .iterate_all_chunks(|_| {
                Err(CorruptionError::new("elsewhere", None, CorruptionCause::BadVersion(0)).into())
            })
            .unwrap_err();
        let corruption = err.as_corruption().unwrap();
        assert_eq!(corruption.dir, dir.path());
        assert_eq!(corruption.file_index, Some(1));
    }

    #[test]
    fn missing_file_index() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        write(&mapper, 1, 0, raw(10, 1));

        let err = mapper.chunk(ChunkDiskMapperRef::new(9, 8)).unwrap_err();
        assert_eq!(err.as_corruption().unwrap().file_index, None);
    }

    #[test]
    fn truncate_keeps_current_file() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        for i in 0..20 {
            write(&mapper, 1, i, raw(100, 0));
        }
        assert_eq!(mapper.file_sequences(), vec![1, 2, 3]);

        mapper.truncate(10).unwrap();
        assert_eq!(mapper.file_sequences(), vec![3]);
        assert!(!segment_file_path(dir.path(), 1).exists());

        // The current file had data, so the next chunk starts file 4.
        let r = write(&mapper, 1, 100, raw(1, 0));
        assert_eq!(r.unpack(), (4, HEADER_SIZE as u64));
    }

    #[test]
    fn full_truncate_resets_sequence() {
        let dir = tempdir().unwrap();
        {
            let mapper = open(dir.path(), config());
            for i in 0..10 {
                write(&mapper, 1, i, raw(100, 0));
            }
        }

        let mapper = open(dir.path(), config());
        mapper.truncate(100).unwrap();
        assert!(mapper.file_sequences().is_empty());

        let r = write(&mapper, 1, 0, raw(1, 0));
        assert_eq!(r.unpack(), (1, HEADER_SIZE as u64));
    }

    #[test]
    fn corrupted_record_is_detected_and_deleted() {
        let dir = tempdir().unwrap();
        {
            let mapper = open(dir.path(), config());
            for i in 0..20 {
                write(&mapper, 1, i, raw(100, 0));
            }
        }

        // Flip a data byte in the first record of file 2.
        let path = segment_file_path(dir.path(), 2);
        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_SIZE + 40] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let mapper = open(dir.path(), config());
        let err = mapper.iterate_all_chunks(|_| Ok(())).unwrap_err();
        let corruption = err.as_corruption().unwrap();
        assert_eq!(corruption.file_index, Some(2));
        assert!(matches!(corruption.cause, CorruptionCause::ChecksumMismatch { .. }));

        let direct = mapper.chunk(ChunkDiskMapperRef::new(2, HEADER_SIZE as u64)).unwrap_err();
        assert!(direct.is_corruption());

        mapper.delete_corrupted(&err).unwrap();
        assert_eq!(mapper.file_sequences(), vec![1]);
        let r = write(&mapper, 1, 0, raw(1, 0));
        assert_eq!(r.seq(), 2);
    }

    #[test]
    fn delete_corrupted_rejects_other_errors() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        assert!(matches!(
            mapper.delete_corrupted(&CoreError::QueueClosed),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn open_repairs_incomplete_last_file() {
        let dir = tempdir().unwrap();
        {
            let mapper = open(dir.path(), config());
            write(&mapper, 1, 0, raw(10, 0));
        }
        fs::write(segment_file_path(dir.path(), 2), [0u8; 2]).unwrap();
        fs::write(dir.path().join("000003.tmp"), format::header(MAGIC_HEAD_CHUNKS)).unwrap();

        let mapper = open(dir.path(), config());
        assert_eq!(mapper.file_sequences(), vec![1]);
        assert!(!dir.path().join("000003.tmp").exists());
    }

    #[test]
    fn open_rejects_gaps_and_bad_headers() {
        let dir = tempdir().unwrap();
        fs::write(segment_file_path(dir.path(), 1), format::header(MAGIC_HEAD_CHUNKS)).unwrap();
        fs::write(segment_file_path(dir.path(), 3), format::header(MAGIC_HEAD_CHUNKS)).unwrap();
        let err = ChunkDiskMapper::open(dir.path(), Arc::new(DefaultPool), config()).unwrap_err();
        assert!(matches!(err, CoreError::UnsequentialFiles { previous: 1, next: 3 }));

        fs::write(segment_file_path(dir.path(), 2), format::header(crate::format::MAGIC_CHUNKS)).unwrap();
        let err = ChunkDiskMapper::open(dir.path(), Arc::new(DefaultPool), config()).unwrap_err();
        let corruption = err.as_corruption().unwrap();
        assert_eq!(corruption.file_index, Some(2));
        assert!(matches!(corruption.cause, CorruptionCause::BadMagic { .. }));

        assert_eq!(remove_files_from(dir.path(), 2).unwrap(), vec![2, 3]);
        assert!(ChunkDiskMapper::open(dir.path(), Arc::new(DefaultPool), config()).is_ok());
    }

    #[test]
    fn operations_after_close_fail() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        let r = write(&mapper, 1, 0, raw(10, 0));
        mapper.close().unwrap();
        mapper.close().unwrap();

        assert!(matches!(mapper.chunk(r), Err(CoreError::MapperClosed)));
        assert!(matches!(
            mapper.write_chunk(SeriesRef::new(1), 0, 1, raw(1, 0), false, |_| {}),
            Err(CoreError::MapperClosed)
        ));
        assert!(matches!(mapper.truncate(1), Err(CoreError::MapperClosed)));
        assert!(matches!(mapper.size(), Err(CoreError::MapperClosed)));
        assert!(matches!(mapper.cut_new_file(), Err(CoreError::MapperClosed)));
        assert!(matches!(
            mapper.iterate_all_chunks(|_| Ok(())),
            Err(CoreError::MapperClosed)
        ));
    }

    #[test]
    fn queued_writes_are_readable_and_drained_on_close() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config().write_queue_size(4));

        let (tx, rx) = mpsc::channel();
        let mut refs = Vec::new();
        for i in 0..30u8 {
            let tx = tx.clone();
            let r = mapper
                .write_chunk(SeriesRef::new(1), i64::from(i), i64::from(i), raw(50, i), false, move |res| {
                    tx.send(res.is_ok()).unwrap();
                })
                .unwrap();
            refs.push(r);
            assert_eq!(mapper.chunk(r).unwrap().chunk.bytes(), vec![i; 50]);
        }
        drop(tx);
        mapper.close().unwrap();

        let outcomes: Vec<_> = rx.iter().collect();
        assert_eq!(outcomes.len(), 30);
        assert!(outcomes.iter().all(|ok| *ok));
        assert_eq!(mapper.stats().completed(), 30);

        let mapper = open(dir.path(), config());
        for (i, r) in refs.iter().enumerate() {
            assert_eq!(mapper.chunk(*r).unwrap().chunk.bytes(), vec![i as u8; 50]);
        }
    }

    #[test]
    fn size_counts_files() {
        let dir = tempdir().unwrap();
        let mapper = open(dir.path(), config());
        write(&mapper, 1, 0, raw(10, 0));
        // The current file is preallocated.
        assert_eq!(mapper.size().unwrap(), SMALL_FILE);
    }
}
