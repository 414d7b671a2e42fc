//! Web storage error types
//!
//! Like the IndexedDB key errors, each one is local to a single raw record.

use thiserror::Error;

use crate::idb::VarintError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebStorageError {
    #[error("key does not match any storage layout")]
    UnknownKey,

    #[error("data key has no origin terminator")]
    MissingOriginTerminator,

    #[error("namespace key is malformed")]
    MalformedNamespace,

    #[error("invalid map id {0:?}")]
    InvalidMapId(String),

    #[error("encoded string is empty")]
    EmptyString,

    #[error("unknown string encoding {0:#04x}")]
    UnknownEncoding(u8),

    #[error("UTF-16 string has odd byte length {0}")]
    OddUtf16Length(usize),

    #[error("unsupported protobuf wire type {0}")]
    UnsupportedWireType(u8),

    #[error("truncated protobuf field at offset {0}")]
    TruncatedField(usize),

    #[error("invalid varint: {0}")]
    Varint(#[from] VarintError),
}

pub type WebStorageResult<T> = Result<T, WebStorageError>;
