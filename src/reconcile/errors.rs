//! Reconciliation errors
//!
//! Each one drops a single entity; the rest of the batch is unaffected.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("{kind} has no identity: {reason}")]
    MissingIdentity { kind: &'static str, reason: String },

    #[error("{kind} entry is not an object")]
    NotAnObject { kind: &'static str },

    #[error("malformed {kind} entry: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("nested field '{field}' is not valid JSON: {reason}")]
    InvalidNestedJson { field: String, reason: String },
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
