//! Checked record parsing over a byte view.
//!
//! [`FrameReader`] wraps any [`ByteView`] (a memory-mapped file or an
//! in-memory buffer) and decodes the live and persisted record formats
//! described in [`crate::format`]. Every access is bounds-checked; malformed
//! input produces a [`FrameError`], never a panic. Callers that know which
//! file they are reading turn frame errors into
//! [`CorruptionError`](crate::CorruptionError)s.

use crate::format::{
    unpack_encoding, CRC_SIZE, ENCODING_SIZE, LIVE_FIXED_SIZE, MAX_LEN_FIELD_SIZE,
    SERIES_REF_SIZE, TIME_SIZE,
};
use crate::types::SeriesRef;
use chunkdb_codec::{varint, Encoding};
use chunkdb_storage::ByteView;
use crc::Crc;
use thiserror::Error;

/// Errors raised while parsing records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The requested range extends past the end of the view.
    #[error("range {start}..{end} out of bounds for length {len}")]
    OutOfRange {
        /// Start of the range.
        start: usize,
        /// End of the range (exclusive).
        end: usize,
        /// Length of the view.
        len: usize,
    },

    /// The length field is not a valid varint that fits in 32 bits.
    #[error("invalid length field at offset {offset}")]
    BadVarint {
        /// Offset of the length field.
        offset: usize,
    },

    /// The stored checksum does not match the record.
    #[error("checksum mismatch expected:{expected:08x}, actual:{actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored after the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },
}

/// Fixed-width fields at the start of a live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRecordHead {
    /// Series the chunk belongs to.
    pub series_ref: SeriesRef,
    /// Lowest timestamp in the chunk.
    pub min_time: i64,
    /// Highest timestamp in the chunk.
    pub max_time: i64,
}

impl LiveRecordHead {
    /// Preallocated space reads as all zeros; real series references are
    /// never zero.
    #[must_use]
    pub fn is_unwritten(&self) -> bool {
        self.series_ref.as_u64() == 0 && self.min_time == 0 && self.max_time == 0
    }
}

/// A fully parsed and checksum-verified live record.
#[derive(Debug, Clone, Copy)]
pub struct LiveRecord<'a> {
    /// Fixed-width fields.
    pub head: LiveRecordHead,
    /// Encoding with the out-of-order bit stripped.
    pub encoding: Encoding,
    /// Whether the out-of-order bit was set.
    pub out_of_order: bool,
    /// Chunk data.
    pub data: &'a [u8],
    /// Offset one past the checksum, where the next record starts.
    pub end: usize,
}

/// A fully parsed and checksum-verified persisted record.
#[derive(Debug, Clone, Copy)]
pub struct PersistedRecord<'a> {
    /// Chunk encoding.
    pub encoding: Encoding,
    /// Chunk data.
    pub data: &'a [u8],
    /// Offset one past the checksum, where the next record starts.
    pub end: usize,
}

/// Bounds-checked reader over a [`ByteView`].
pub struct FrameReader<'a, V: ByteView + ?Sized> {
    view: &'a V,
    checksum: &'static Crc<u32>,
}

impl<V: ByteView + ?Sized> std::fmt::Debug for FrameReader<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("len", &self.view.len())
            .finish_non_exhaustive()
    }
}

impl<'a, V: ByteView + ?Sized> FrameReader<'a, V> {
    /// Creates a reader verifying records with `checksum`.
    pub fn new(view: &'a V, checksum: &'static Crc<u32>) -> Self {
        Self { view, checksum }
    }

    /// Length of the underlying view.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if the underlying view is empty.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Returns the bytes in `start..end`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::OutOfRange`] if the range is not inside the view.
    pub fn range(&self, start: usize, end: usize) -> Result<&'a [u8], FrameError> {
        self.view.range(start, end).map_err(|_| FrameError::OutOfRange {
            start,
            end,
            len: self.view.len(),
        })
    }

    /// Returns true if every byte in `start..end` is zero.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::OutOfRange`] if the range is not inside the view.
    pub fn is_zeroed(&self, start: usize, end: usize) -> Result<bool, FrameError> {
        Ok(self.range(start, end)?.iter().all(|b| *b == 0))
    }

    fn read_u64(&self, offset: usize) -> Result<u64, FrameError> {
        let b = self.range(offset, offset + 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    fn read_u32(&self, offset: usize) -> Result<u32, FrameError> {
        let b = self.range(offset, offset + 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a length field of at most five bytes at `offset`.
    ///
    /// Returns the length and the number of bytes the field used.
    fn read_len(&self, offset: usize) -> Result<(usize, usize), FrameError> {
        let end = (offset + MAX_LEN_FIELD_SIZE).min(self.view.len());
        let field = self.range(offset, end.max(offset))?;
        match varint::read_uvarint(field) {
            Ok((len, n)) => {
                let len = u32::try_from(len).map_err(|_| FrameError::BadVarint { offset })?;
                Ok((len as usize, n))
            }
            Err(chunkdb_codec::CodecError::UnexpectedEof) if end < offset + MAX_LEN_FIELD_SIZE => {
                Err(FrameError::OutOfRange {
                    start: offset,
                    end: offset + MAX_LEN_FIELD_SIZE,
                    len: self.view.len(),
                })
            }
            Err(_) => Err(FrameError::BadVarint { offset }),
        }
    }

    fn verify(&self, start: usize, end: usize) -> Result<usize, FrameError> {
        let expected = self.read_u32(end)?;
        let actual = self.checksum.checksum(self.range(start, end)?);
        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }
        Ok(end + CRC_SIZE)
    }

    /// Reads the fixed-width fields of the live record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::OutOfRange`] if the fields extend past the view.
    pub fn live_head(&self, offset: usize) -> Result<LiveRecordHead, FrameError> {
        let series_ref = self.read_u64(offset)?;
        let min_time = self.read_u64(offset + SERIES_REF_SIZE)? as i64;
        let max_time = self.read_u64(offset + SERIES_REF_SIZE + TIME_SIZE)? as i64;
        Ok(LiveRecordHead {
            series_ref: SeriesRef::new(series_ref),
            min_time,
            max_time,
        })
    }

    /// Reads and verifies the live record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is truncated, its length field is
    /// malformed, or its checksum does not match.
    pub fn live_record(&self, offset: usize) -> Result<LiveRecord<'a>, FrameError> {
        let head = self.live_head(offset)?;
        let enc_pos = offset + SERIES_REF_SIZE + 2 * TIME_SIZE;
        let stored = self.range(enc_pos, enc_pos + ENCODING_SIZE)?[0];
        let (encoding, out_of_order) = unpack_encoding(stored);

        let len_pos = offset + LIVE_FIXED_SIZE;
        let (len, n) = self.read_len(len_pos)?;
        let data_start = len_pos + n;
        let data = self.range(data_start, data_start + len)?;
        let end = self.verify(offset, data_start + len)?;

        Ok(LiveRecord {
            head,
            encoding,
            out_of_order,
            data,
            end,
        })
    }

    /// Reads and verifies the persisted record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is truncated, its length field is
    /// malformed, or its checksum does not match.
    pub fn persisted_record(&self, offset: usize) -> Result<PersistedRecord<'a>, FrameError> {
        let (len, n) = self.read_len(offset)?;
        let enc_pos = offset + n;
        let encoding = Encoding::new(self.range(enc_pos, enc_pos + ENCODING_SIZE)?[0]);
        let data_start = enc_pos + ENCODING_SIZE;
        let data = self.range(data_start, data_start + len)?;
        let end = self.verify(enc_pos, data_start + len)?;

        Ok(PersistedRecord {
            encoding,
            data,
            end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{pack_encoding, CRC32_CASTAGNOLI};
    use bytes::BufMut;
    use chunkdb_storage::InMemoryBytes;
    use proptest::prelude::*;

    fn live_bytes(series: u64, mint: i64, maxt: i64, ooo: bool, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u64(series);
        buf.put_i64(mint);
        buf.put_i64(maxt);
        buf.put_u8(pack_encoding(Encoding::DELTA, ooo));
        varint::put_uvarint(&mut buf, data.len() as u64);
        buf.put_slice(data);
        let crc = CRC32_CASTAGNOLI.checksum(&buf);
        buf.put_u32(crc);
        buf
    }

    #[test]
    fn debug_shows_view_length() {
        let view = InMemoryBytes::new(vec![0; 12]);
        let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);
        assert_eq!(format!("{reader:?}"), "FrameReader { len: 12, .. }");
    }

    #[test]
    fn parses_live_record() {
        let mut buf = vec![0xEE; 3];
        buf.extend(live_bytes(7, 10, 20, true, b"chunk"));
        let view = InMemoryBytes::new(buf.clone());
        let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);

        let rec = reader.live_record(3).unwrap();
        assert_eq!(rec.head.series_ref, SeriesRef::new(7));
        assert_eq!((rec.head.min_time, rec.head.max_time), (10, 20));
        assert_eq!(rec.encoding, Encoding::DELTA);
        assert!(rec.out_of_order);
        assert_eq!(rec.data, b"chunk");
        assert_eq!(rec.end, buf.len());
    }

    #[test]
    fn detects_flipped_bit() {
        let mut buf = live_bytes(1, 0, 1, false, b"payload");
        buf[27] ^= 0x01;
        let view = InMemoryBytes::new(buf);
        let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);

        assert!(matches!(
            reader.live_record(0),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_live_record_is_out_of_range() {
        let buf = live_bytes(1, 0, 1, false, b"payload");
        let view = InMemoryBytes::new(buf[..buf.len() - 2].to_vec());
        let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);

        assert!(matches!(
            reader.live_record(0),
            Err(FrameError::OutOfRange { .. })
        ));
    }

    #[test]
    fn unwritten_head() {
        let view = InMemoryBytes::new(vec![0u8; 64]);
        let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);
        assert!(reader.live_head(0).unwrap().is_unwritten());
        assert!(reader.is_zeroed(0, 64).unwrap());
    }

    #[test]
    fn parses_persisted_record() {
        let mut buf = Vec::new();
        varint::put_uvarint(&mut buf, 3);
        buf.put_u8(1);
        buf.put_slice(b"abc");
        let crc = CRC32_CASTAGNOLI.checksum(&buf[1..]);
        buf.put_u32(crc);
        let view = InMemoryBytes::new(buf);
        let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);

        let rec = reader.persisted_record(0).unwrap();
        assert_eq!(rec.encoding, Encoding::DELTA);
        assert_eq!(rec.data, b"abc");
        assert_eq!(rec.end, 9);
    }

    #[test]
    fn oversized_length_field_is_rejected() {
        let view = InMemoryBytes::new(vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0, 0, 0, 0]);
        let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);
        assert_eq!(
            reader.persisted_record(0).unwrap_err(),
            FrameError::BadVarint { offset: 0 }
        );
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(
            data in proptest::collection::vec(any::<u8>(), 0..128),
            offset in 0usize..160,
        ) {
            let view = InMemoryBytes::new(data);
            let reader = FrameReader::new(&view, &CRC32_CASTAGNOLI);
            let _ = reader.live_record(offset);
            let _ = reader.persisted_record(offset);
        }
    }
}
