//! Unsigned LEB128 varints, as used in chunk and record length fields.
//!
//! Each byte carries seven bits of payload, least significant group first,
//! with the high bit set on every byte except the last. Values below 128
//! take one byte; a `u32` never takes more than five.

use crate::error::{CodecError, CodecResult};
use bytes::BufMut;

/// Maximum encoded length of a `u32`.
pub const MAX_VARINT_LEN32: usize = 5;

/// Maximum encoded length of a `u64`.
pub const MAX_VARINT_LEN64: usize = 10;

/// Appends `value` as an unsigned varint.
pub fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Returns the number of bytes [`put_uvarint`] writes for `value`.
#[must_use]
pub fn uvarint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decodes an unsigned varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// - [`CodecError::UnexpectedEof`] if `data` ends mid-varint
/// - [`CodecError::VarintOverflow`] if the value does not fit in 64 bits
pub fn read_uvarint(data: &[u8]) -> CodecResult<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if i == MAX_VARINT_LEN64 {
            return Err(CodecError::VarintOverflow);
        }
        if byte < 0x80 {
            if i == MAX_VARINT_LEN64 - 1 && byte > 1 {
                return Err(CodecError::VarintOverflow);
            }
            return Ok((value | (u64::from(byte) << shift), i + 1));
        }
        value |= u64::from(byte & 0x7F) << shift;
        shift += 7;
    }
    Err(CodecError::UnexpectedEof)
}

/// Appends a signed value using ZigZag mapping followed by a varint.
pub fn put_varint(buf: &mut impl BufMut, value: i64) {
    put_uvarint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

/// Decodes a ZigZag varint from the front of `data`.
///
/// # Errors
///
/// Same as [`read_uvarint`].
pub fn read_varint(data: &[u8]) -> CodecResult<(i64, usize)> {
    let (unsigned, n) = read_uvarint(data)?;
    let value = (unsigned >> 1) as i64;
    if unsigned & 1 != 0 {
        Ok((!value, n))
    } else {
        Ok((value, n))
    }
}
