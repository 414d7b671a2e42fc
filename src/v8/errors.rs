//! Value decoding error types
//!
//! Every error is local to one record value. The caller logs it and skips
//! the record; a partially decoded value is never returned.

use std::fmt;

use thiserror::Error;

use crate::idb::VarintError;

/// What went wrong inside a V8 stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("unexpected end of stream")]
    UnexpectedEnd,

    #[error("invalid varint: {0}")]
    Varint(VarintError),

    #[error("varint {0} does not fit in 32 bits")]
    Uint32Overflow(u64),

    #[error("unknown type tag {0:#04x}")]
    UnknownTag(u8),

    #[error("back-reference {id} out of range ({allocated} objects allocated)")]
    BackReferenceOutOfRange { id: u64, allocated: usize },

    #[error("back-reference {0} points at an object still being decoded")]
    UnresolvedBackReference(u32),

    #[error("unsupported host object tag {0:#04x}")]
    UnsupportedHostObject(u8),

    #[error("property key is not a string or number")]
    InvalidPropertyKey,

    #[error("expected a string value")]
    ExpectedString,

    #[error("container declares {expected} entries, stream holds {actual}")]
    CountMismatch { expected: u64, actual: u64 },

    #[error("length {0} exceeds remaining input")]
    InvalidLength(u64),

    #[error("nesting deeper than {0} levels")]
    DepthExceeded(usize),
}

/// A decode failure with the offset and the last tag read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}{}", TagSuffix(*.last_tag))]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub offset: usize,
    pub last_tag: Option<u8>,
}

struct TagSuffix(Option<u8>);

impl fmt::Display for TagSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(tag) if tag.is_ascii_graphic() => write!(f, " (last tag '{}')", tag as char),
            Some(tag) => write!(f, " (last tag {:#04x})", tag),
            None => Ok(()),
        }
    }
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, offset: usize, last_tag: Option<u8>) -> Self {
        Self {
            kind,
            offset,
            last_tag,
        }
    }
}

/// Failure reading the IndexedDB/Blink framing in front of the V8 stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("value is empty")]
    Empty,

    #[error("invalid value version: {0}")]
    ValueVersion(VarintError),

    #[error("value ends before the blink envelope tag")]
    MissingTag,

    #[error("unsupported envelope tag {0:#04x}, expected 0xff")]
    UnsupportedTag(u8),

    #[error("invalid blink version: {0}")]
    BlinkVersion(VarintError),

    #[error("truncated blink trailer")]
    TruncatedTrailer,
}

/// A decoded value too large or too deep to resolve into a plain tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("resolved value nests deeper than {0} levels")]
    DepthExceeded(usize),

    #[error("resolved value exceeds {0} nodes")]
    TooManyNodes(usize),
}

/// Any failure turning record value bytes into a `JsValue` or its plain tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("v8: {0}")]
    Decode(#[from] DecodeError),

    #[error("resolve: {0}")]
    Resolve(#[from] ResolveError),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
