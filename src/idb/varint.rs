//! Little-endian base-128 varints
//!
//! Chromium's IndexedDB backing store uses the same 7-bits-per-byte
//! encoding for object-store ids in keys, metadata values and the value
//! envelope. At most 10 bytes encode a `u64`.

use super::errors::VarintError;

const MAX_VARINT_LEN: usize = 10;

/// Decode a varint from the start of `data`, returning (value, bytes_consumed).
pub fn read_varint(data: &[u8]) -> Result<(u64, usize), VarintError> {
    read_varint_at(data, 0)
}

/// Decode a varint starting at `offset`. Errors carry the absolute offset.
pub fn read_varint_at(data: &[u8], offset: usize) -> Result<(u64, usize), VarintError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in data.iter().skip(offset).enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(VarintError::Overflow { offset });
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }

    Err(VarintError::Truncated { offset })
}

/// Encode `value` as a varint, appending to `buf`.
pub fn write_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}
