//! Random access to persisted segments.

use crate::config::SegmentConfig;
use crate::error::{CoreError, CoreResult, CorruptionCause, CorruptionError};
use crate::format::{self, HEADER_SIZE, MAGIC_CHUNKS};
use crate::framed::FrameReader;
use crate::types::{ChunkMeta, ChunkRef};
use bytes::Bytes;
use chunkdb_codec::{Chunk, ChunkPool};
use chunkdb_storage::{list_sequence_files, ByteView, MappedFile};
use crc::Crc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reads chunks from persisted segments by reference.
pub struct SegmentReader {
    dir: PathBuf,
    segments: BTreeMap<u64, Box<dyn ByteView>>,
    pool: Arc<dyn ChunkPool>,
    checksum: &'static Crc<u32>,
    size: u64,
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("dir", &self.dir)
            .field("segments", &self.segments.keys().collect::<Vec<_>>())
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl SegmentReader {
    /// Maps every segment in `dir`.
    ///
    /// # Errors
    ///
    /// Returns a corruption error naming the segment if a header is invalid,
    /// or an I/O error.
    pub fn open(
        dir: impl AsRef<Path>,
        pool: Arc<dyn ChunkPool>,
        config: &SegmentConfig,
    ) -> CoreResult<Self> {
        let dir = dir.as_ref();
        let mut views: Vec<(u64, Box<dyn ByteView>)> = Vec::new();
        for (seq, path) in list_sequence_files(dir)? {
            let view: Box<dyn ByteView> = Box::new(MappedFile::open(&path)?);
            views.push((seq, view));
        }
        Self::from_views(dir, views, pool, config)
    }

    /// Builds a reader over already loaded segments, keyed by sequence
    /// number. `dir` only labels errors.
    ///
    /// # Errors
    ///
    /// Returns a corruption error naming the segment if a header is invalid.
    pub fn from_views(
        dir: impl Into<PathBuf>,
        views: Vec<(u64, Box<dyn ByteView>)>,
        pool: Arc<dyn ChunkPool>,
        config: &SegmentConfig,
    ) -> CoreResult<Self> {
        let dir = dir.into();
        let mut segments = BTreeMap::new();
        let mut size = 0u64;
        for (seq, view) in views {
            format::check_header(view.as_slice(), MAGIC_CHUNKS)
                .map_err(|cause| CorruptionError::new(&dir, Some(seq), cause))?;
            size += view.len() as u64;
            segments.insert(seq, view);
        }
        Ok(Self {
            dir,
            segments,
            pool,
            checksum: config.checksum,
            size,
        })
    }

    /// Combined size of all segments in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Sequence numbers of the segments, ascending.
    pub fn segment_sequences(&self) -> Vec<u64> {
        self.segments.keys().copied().collect()
    }

    fn corruption(&self, seq: u64, cause: CorruptionCause) -> CoreError {
        CorruptionError::new(&self.dir, Some(seq), cause).into()
    }

    /// Reads the chunk `meta` refers to.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the segment does not exist, the record
    /// is truncated, its checksum does not match, or it cannot be decoded.
    pub fn chunk(&self, meta: &ChunkMeta) -> CoreResult<Arc<dyn Chunk>> {
        self.chunk_at(meta.chunk_ref)
    }

    /// Reads the chunk at `chunk_ref`. See [`SegmentReader::chunk`].
    ///
    /// # Errors
    ///
    /// See [`SegmentReader::chunk`].
    pub fn chunk_at(&self, chunk_ref: ChunkRef) -> CoreResult<Arc<dyn Chunk>> {
        let (seq, offset) = chunk_ref.unpack();
        let Some(view) = self.segments.get(&seq) else {
            return Err(CorruptionError::new(
                &self.dir,
                None,
                CorruptionCause::MissingFile { seq },
            )
            .into());
        };

        let reader = FrameReader::new(&**view, self.checksum);
        let record = reader
            .persisted_record(offset as usize)
            .map_err(|err| self.corruption(seq, err.into()))?;
        self.pool
            .get(record.encoding, Bytes::copy_from_slice(record.data))
            .map_err(|err| self.corruption(seq, CorruptionCause::Decode(err)))
    }

    /// Visits every chunk of every segment in order.
    ///
    /// A run of zeros at the end of a segment (preallocated space left by
    /// an interrupted write) ends that segment.
    ///
    /// # Errors
    ///
    /// Returns the first corruption found or the first error from `visitor`.
    pub fn for_each_chunk<F>(&self, mut visitor: F) -> CoreResult<()>
    where
        F: FnMut(ChunkRef, Arc<dyn Chunk>) -> CoreResult<()>,
    {
        for (seq, view) in &self.segments {
            let reader = FrameReader::new(&**view, self.checksum);
            let mut offset = HEADER_SIZE;
            while offset < reader.len() {
                let record = match reader.persisted_record(offset) {
                    Ok(record) => record,
                    Err(_) if reader.is_zeroed(offset, reader.len()).unwrap_or(false) => break,
                    Err(err) => return Err(self.corruption(*seq, err.into())),
                };
                let chunk = self
                    .pool
                    .get(record.encoding, Bytes::copy_from_slice(record.data))
                    .map_err(|err| self.corruption(*seq, CorruptionCause::Decode(err)))?;
                visitor(ChunkRef::new(*seq, offset as u64), chunk)?;
                offset = record.end;
            }
        }
        Ok(())
    }
}
