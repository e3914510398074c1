//! On-disk layout constants shared by the live and persisted chunk files.
//!
//! Every file starts with an 8-byte header:
//!
//! ```text
//! | magic (4, BE) | version (1) | padding (3, zero) |
//! ```
//!
//! Live records:
//!
//! ```text
//! | series ref (8) | min time (8) | max time (8) | encoding (1) | len (uvarint) | data | crc32 (4) |
//! ```
//!
//! Persisted records:
//!
//! ```text
//! | len (uvarint) | encoding (1) | data | crc32 (4) |
//! ```
//!
//! All integers are big-endian. Checksums are CRC-32C (Castagnoli).

use crate::error::CorruptionCause;
use chunkdb_codec::{varint::MAX_VARINT_LEN32, Encoding};
use crc::{Crc, CRC_32_ISCSI};

/// Magic number of live chunk files.
pub const MAGIC_HEAD_CHUNKS: u32 = 0x0130_BC91;
/// Magic number of persisted segment files.
pub const MAGIC_CHUNKS: u32 = 0x85BD_40DD;
/// Current file format version.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the magic number.
pub const MAGIC_SIZE: usize = 4;
/// Size of the version byte.
pub const VERSION_SIZE: usize = 1;
/// Size of the header padding.
pub const PADDING_SIZE: usize = 3;
/// Size of the file header.
pub const HEADER_SIZE: usize = MAGIC_SIZE + VERSION_SIZE + PADDING_SIZE;

/// Size of the series reference field.
pub const SERIES_REF_SIZE: usize = 8;
/// Size of each of the min/max time fields.
pub const TIME_SIZE: usize = 8;
/// Size of the encoding byte.
pub const ENCODING_SIZE: usize = 1;
/// Largest encoded size of the data length field.
pub const MAX_LEN_FIELD_SIZE: usize = MAX_VARINT_LEN32;
/// Size of the trailing checksum.
pub const CRC_SIZE: usize = 4;

/// Fixed-width prefix of a live record, up to the encoding byte.
pub const LIVE_FIXED_SIZE: usize = SERIES_REF_SIZE + 2 * TIME_SIZE + ENCODING_SIZE;
/// Largest record overhead besides the data: fixed prefix, widest length
/// field and checksum.
pub const MAX_LIVE_META_SIZE: usize = LIVE_FIXED_SIZE + MAX_LEN_FIELD_SIZE + CRC_SIZE;
/// Smallest possible live record: an empty chunk with a one-byte length.
pub const MIN_LIVE_RECORD_SIZE: usize = LIVE_FIXED_SIZE + 1 + CRC_SIZE;

/// Encoding bit marking out-of-order chunks in live files.
pub const OUT_OF_ORDER_MASK: u8 = 0b1000_0000;

/// CRC-32C, used for every record checksum.
pub static CRC32_CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Builds a file header for the given magic number.
#[must_use]
pub fn header(magic: u32) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[..MAGIC_SIZE].copy_from_slice(&magic.to_be_bytes());
    buf[MAGIC_SIZE] = FORMAT_VERSION;
    buf
}

/// Validates a file header.
///
/// # Errors
///
/// Returns the cause if the data is shorter than a header or carries the
/// wrong magic or version.
pub fn check_header(data: &[u8], magic: u32) -> Result<(), CorruptionCause> {
    if data.len() < HEADER_SIZE {
        return Err(CorruptionCause::ShortRead {
            offset: 0,
            required: HEADER_SIZE as u64,
            available: data.len() as u64,
        });
    }
    let actual = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if actual != magic {
        return Err(CorruptionCause::BadMagic {
            expected: magic,
            actual,
        });
    }
    if data[MAGIC_SIZE] != FORMAT_VERSION {
        return Err(CorruptionCause::BadVersion(data[MAGIC_SIZE]));
    }
    Ok(())
}

/// Packs an encoding and the out-of-order flag into the stored byte.
#[must_use]
pub fn pack_encoding(encoding: Encoding, out_of_order: bool) -> u8 {
    if out_of_order {
        encoding.as_u8() | OUT_OF_ORDER_MASK
    } else {
        encoding.as_u8()
    }
}

/// Splits a stored encoding byte into the encoding and the out-of-order flag.
#[must_use]
pub fn unpack_encoding(stored: u8) -> (Encoding, bool) {
    (
        Encoding::new(stored & !OUT_OF_ORDER_MASK),
        stored & OUT_OF_ORDER_MASK != 0,
    )
}

/// Worst-case number of bytes a live record with `data_len` bytes of data
/// occupies. The cursor reserves this much per chunk.
#[must_use]
pub fn live_record_size(data_len: usize) -> u64 {
    let len_field = chunkdb_codec::varint::uvarint_len(data_len as u64);
    (LIVE_FIXED_SIZE + len_field + data_len + CRC_SIZE) as u64
}
