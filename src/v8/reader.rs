//! Byte cursor for the V8 serialization stream
//!
//! Tracks the position and the last tag read, so every error carries
//! enough context to locate the fault in the raw value.

use crate::idb::read_varint_at;

use super::errors::{DecodeError, DecodeErrorKind, DecodeResult};

pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    last_tag: Option<u8>,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            last_tag: None,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn last_tag(&self) -> Option<u8> {
        self.last_tag
    }

    /// Build an error at the current position.
    pub fn error(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(kind, self.pos, self.last_tag)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        let byte = self
            .peek_u8()
            .ok_or_else(|| self.error(DecodeErrorKind::UnexpectedEnd))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read a tag byte, skipping padding, and remember it for error context.
    pub fn read_tag(&mut self) -> DecodeResult<u8> {
        loop {
            let tag = self.read_u8()?;
            if tag != 0x00 {
                self.last_tag = Some(tag);
                return Ok(tag);
            }
        }
    }

    /// Next non-padding tag without consuming it.
    pub fn peek_tag(&mut self) -> Option<u8> {
        while self.peek_u8() == Some(0x00) {
            self.pos += 1;
        }
        self.peek_u8()
    }

    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.error(DecodeErrorKind::InvalidLength(len as u64)));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_varint(&mut self) -> DecodeResult<u64> {
        let (value, used) = read_varint_at(self.data, self.pos)
            .map_err(|e| self.error(DecodeErrorKind::Varint(e)))?;
        self.pos += used;
        Ok(value)
    }

    pub fn read_varint_u32(&mut self) -> DecodeResult<u32> {
        let start = self.pos;
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| {
            DecodeError::new(DecodeErrorKind::Uint32Overflow(value), start, self.last_tag)
        })
    }

    /// Varint length, checked against the bytes left in the stream.
    pub fn read_length(&mut self) -> DecodeResult<usize> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(self.error(DecodeErrorKind::InvalidLength(len)));
        }
        Ok(len as usize)
    }

    pub fn read_zigzag_i32(&mut self) -> DecodeResult<i32> {
        let raw = self.read_varint_u32()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    pub fn read_f64(&mut self) -> DecodeResult<f64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }
}
