//! Delta-encoded sample chunks.
//!
//! ## Layout
//!
//! ```text
//! | count (2, BE) | t0 (zigzag varint) | v0 (8, BE f64) | dt1 (zigzag varint) | v1 (8) | ...
//! ```
//!
//! Timestamps after the first are stored as the difference from the previous
//! timestamp, so regularly scraped series spend one or two bytes per
//! timestamp. Values are stored verbatim.

use crate::chunk::{Chunk, Sample};
use crate::encoding::Encoding;
use crate::error::{CodecError, CodecResult};
use crate::varint::{put_varint, read_varint};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the sample count prefix.
const COUNT_SIZE: usize = 2;

/// A chunk of samples using [`Encoding::DELTA`].
///
/// # Example
///
/// ```rust
/// use chunkdb_codec::{Chunk, Sample, SampleChunk};
///
/// let mut chunk = SampleChunk::new();
/// chunk.append(1000, 1.5).unwrap();
/// chunk.append(2000, 2.5).unwrap();
///
/// assert_eq!(chunk.num_samples(), 2);
/// assert_eq!(chunk.samples().unwrap()[1], Sample::new(2000, 2.5));
/// ```
#[derive(Debug, Clone)]
pub struct SampleChunk {
    data: BytesMut,
    count: u16,
    last_t: i64,
}

impl SampleChunk {
    /// Creates an empty chunk.
    #[must_use]
    pub fn new() -> Self {
        let mut data = BytesMut::with_capacity(128);
        data.put_u16(0);
        Self {
            data,
            count: 0,
            last_t: 0,
        }
    }

    /// Builds a chunk from a slice of samples.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ChunkFull`] if there are more than `u16::MAX`
    /// samples.
    pub fn from_samples(samples: &[Sample]) -> CodecResult<Self> {
        let mut chunk = Self::new();
        for s in samples {
            chunk.append(s.t, s.v)?;
        }
        Ok(chunk)
    }

    /// Rebuilds a chunk from its encoded bytes, validating the layout.
    ///
    /// # Errors
    ///
    /// Returns a decoding error if the bytes are truncated or carry trailing
    /// garbage.
    pub fn from_bytes(data: Bytes) -> CodecResult<Self> {
        let samples = decode_samples(&data)?;
        let last_t = samples.last().map_or(0, |s| s.t);
        let count = samples.len() as u16;
        Ok(Self {
            data: BytesMut::from(&data[..]),
            count,
            last_t,
        })
    }

    /// Appends a sample.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ChunkFull`] once the chunk holds `u16::MAX`
    /// samples.
    pub fn append(&mut self, t: i64, v: f64) -> CodecResult<()> {
        if self.count == u16::MAX {
            return Err(CodecError::ChunkFull(usize::from(self.count)));
        }
        let stored_t = if self.count == 0 { t } else { t.wrapping_sub(self.last_t) };
        put_varint(&mut self.data, stored_t);
        self.data.put_f64(v);

        self.count += 1;
        self.last_t = t;
        self.data[..COUNT_SIZE].copy_from_slice(&self.count.to_be_bytes());
        Ok(())
    }

    /// Returns a cheap, immutable copy of the encoded bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }
}

impl Default for SampleChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk for SampleChunk {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn encoding(&self) -> Encoding {
        Encoding::DELTA
    }

    fn num_samples(&self) -> usize {
        usize::from(self.count)
    }

    fn samples(&self) -> CodecResult<Vec<Sample>> {
        decode_samples(&self.data)
    }
}

/// Walks the encoded bytes and returns every sample.
fn decode_samples(data: &[u8]) -> CodecResult<Vec<Sample>> {
    let mut decoder = SampleDecoder::new(data);
    let count = decoder.read_count()?;
    let mut samples = Vec::with_capacity(usize::from(count));
    let mut t = 0i64;
    for i in 0..count {
        let stored_t = decoder.read_varint()?;
        t = if i == 0 { stored_t } else { t.wrapping_add(stored_t) };
        let v = decoder.read_f64()?;
        samples.push(Sample::new(t, v));
    }
    if !decoder.is_empty() {
        return Err(CodecError::invalid_structure(format!(
            "{} trailing bytes after {count} samples",
            decoder.remaining()
        )));
    }
    Ok(samples)
}

struct SampleDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SampleDecoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_count(&mut self) -> CodecResult<u16> {
        let b = self.read_bytes(COUNT_SIZE)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_varint(&mut self) -> CodecResult<i64> {
        let (value, n) = read_varint(&self.data[self.pos..])?;
        self.pos += n;
        Ok(value)
    }

    fn read_f64(&mut self) -> CodecResult<f64> {
        let b = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_be_bytes(raw))
    }
}
