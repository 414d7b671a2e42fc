//! IndexedDB key and metadata error types
//!
//! Both error kinds are local to a single raw record: the record is skipped
//! and the catalog build or classification pass continues.

use thiserror::Error;

/// Truncated or overflowing little-endian base-128 varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarintError {
    #[error("truncated varint at offset {offset}")]
    Truncated { offset: usize },

    #[error("varint overflows 64 bits at offset {offset}")]
    Overflow { offset: usize },
}

impl VarintError {
    /// Byte offset at which the varint started.
    pub fn offset(&self) -> usize {
        match self {
            VarintError::Truncated { offset } | VarintError::Overflow { offset } => *offset,
        }
    }
}

/// A key whose bytes do not match any known IndexedDB key shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("key is empty")]
    Empty,

    #[error("key prefix truncated: need {needed} bytes, have {available}")]
    TruncatedPrefix { needed: usize, available: usize },

    #[error("key is missing its metadata type byte")]
    MissingMetaType,

    #[error("key does not match any metadata or data shape")]
    UnknownShape,

    #[error("truncated string at offset {offset}")]
    TruncatedString { offset: usize },

    #[error("unknown user key type {0:#04x}")]
    UnknownKeyType(u8),

    #[error("invalid varint in key: {0}")]
    Varint(#[from] VarintError),
}

impl KeyParseError {
    /// True when the failure came from a corrupt varint rather than an
    /// unrecognised (but possibly legitimate) key shape.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, KeyParseError::UnknownShape)
    }
}
