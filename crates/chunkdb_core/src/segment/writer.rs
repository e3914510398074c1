//! Batched segment writing.

use crate::config::SegmentConfig;
use crate::error::{CoreError, CoreResult};
use crate::format::{self, CRC_SIZE, ENCODING_SIZE, HEADER_SIZE, MAGIC_CHUNKS, MAX_LEN_FIELD_SIZE};
use crate::types::{ChunkMeta, ChunkRef};
use chunkdb_codec::varint;
use chunkdb_storage::{cut_segment_file, truncate_file};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Buffer in front of the segment file.
const WRITE_BUFFER_SIZE: usize = 8 * 1024 * 1024;

struct Tail {
    seq: u64,
    writer: BufWriter<File>,
}

/// Writes chunks into size-bounded segment files.
///
/// Segments are cut only between batches: chunks passed to one
/// [`SegmentWriter::write_chunks`] call are split into as few segments as the
/// size budget allows, and a segment is never left empty.
pub struct SegmentWriter {
    dir: PathBuf,
    config: SegmentConfig,
    tail: Option<Tail>,
    // Bytes in the tail segment, header included; 0 before the first cut.
    n: u64,
}

impl std::fmt::Debug for SegmentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentWriter")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("tail", &self.tail.as_ref().map(|t| t.seq))
            .field("n", &self.n)
            .finish()
    }
}

impl SegmentWriter {
    /// Creates a writer for `dir`, creating the directory if needed. New
    /// segments are numbered after any already in the directory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an invalid configuration,
    /// or an error if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>, config: SegmentConfig) -> CoreResult<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            config,
            tail: None,
            n: 0,
        })
    }

    /// Writes the chunks, assigning each its [`ChunkRef`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a meta has no chunk, or an
    /// I/O error.
    pub fn write_chunks(&mut self, chunks: &mut [ChunkMeta]) -> CoreResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks.iter().any(|m| m.chunk.is_none()) {
            return Err(CoreError::invalid_operation("chunk meta without a chunk"));
        }

        let batches = self.plan_batches(chunks);
        if self.n == 0 {
            self.cut()?;
        }
        let last = batches.len() - 1;
        for (i, (start, end)) in batches.into_iter().enumerate() {
            self.write_batch(&mut chunks[start..end])?;
            // No empty segment after the last batch.
            if i < last {
                self.cut()?;
            }
        }
        Ok(())
    }

    /// Splits `chunks` into index ranges, one per segment. The first range
    /// accounts for bytes already in the tail segment and may be empty.
    fn plan_batches(&self, chunks: &[ChunkMeta]) -> Vec<(usize, usize)> {
        let segment_size = self.config.segment_size;
        let header = HEADER_SIZE as u64;
        let mut batches = vec![(0, 0)];
        let mut batch_size = 0u64;
        let mut batch_start = 0;
        let mut first_batch = true;

        for (i, meta) in chunks.iter().enumerate() {
            let data_len = meta.chunk.as_ref().map_or(0, |c| c.bytes().len());
            // The length field is sized for its widest encoding.
            let chunk_size = (MAX_LEN_FIELD_SIZE + ENCODING_SIZE + data_len + CRC_SIZE) as u64;
            batch_size += chunk_size;

            let mut cut_new_batch = i != 0 && batch_size + header > segment_size;
            if first_batch && self.n > header {
                cut_new_batch = batch_size + self.n > segment_size;
                if cut_new_batch {
                    first_batch = false;
                }
            }
            if cut_new_batch {
                batch_start = i;
                batches.push((i, i));
                batch_size = chunk_size;
            }
            if let Some(last) = batches.last_mut() {
                *last = (batch_start, i + 1);
            }
        }
        batches
    }

    fn write_batch(&mut self, chunks: &mut [ChunkMeta]) -> CoreResult<()> {
        let checksum = self.config.checksum;
        let tail = self
            .tail
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("no segment open for writing"))?;

        let mut len_field = Vec::with_capacity(MAX_LEN_FIELD_SIZE);
        for meta in chunks {
            let Some(chunk) = meta.chunk.as_ref() else {
                continue;
            };
            let data = chunk.bytes();
            meta.chunk_ref = ChunkRef::new(tail.seq, self.n);

            len_field.clear();
            varint::put_uvarint(&mut len_field, data.len() as u64);
            let encoding = [chunk.encoding().as_u8()];

            let mut digest = checksum.digest();
            digest.update(&encoding);
            digest.update(data);
            let crc = digest.finalize();

            tail.writer.write_all(&len_field)?;
            tail.writer.write_all(&encoding)?;
            tail.writer.write_all(data)?;
            tail.writer.write_all(&crc.to_be_bytes())?;
            self.n += (len_field.len() + ENCODING_SIZE + data.len() + CRC_SIZE) as u64;
        }
        Ok(())
    }

    fn cut(&mut self) -> CoreResult<()> {
        self.finalize_tail()?;
        let header = format::header(MAGIC_CHUNKS);
        let cut = cut_segment_file(&self.dir, &header, self.config.segment_size)?;
        debug!(dir = %self.dir.display(), seq = cut.seq, "cut new segment");
        self.tail = Some(Tail {
            seq: cut.seq,
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, cut.file),
        });
        self.n = cut.header_len;
        Ok(())
    }

    /// Flushes and syncs the tail segment and truncates its preallocated
    /// space.
    fn finalize_tail(&mut self) -> CoreResult<()> {
        let Some(tail) = self.tail.as_mut() else {
            return Ok(());
        };
        tail.writer.flush()?;
        truncate_file(tail.writer.get_ref(), self.n)?;
        self.tail = None;
        Ok(())
    }

    /// Finalizes the tail segment. Later writes start a new segment.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or truncating fails.
    pub fn close(&mut self) -> CoreResult<()> {
        self.finalize_tail()?;
        self.n = 0;
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(dir = %self.dir.display(), error = %err, "closing segment writer failed");
        }
    }
}
