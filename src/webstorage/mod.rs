//! Chromium local and session storage over raw LevelDB records
//!
//! Both stores live in their own LevelDB directories next to IndexedDB and
//! reach this crate through the same `RawRecord` supply. This module only
//! knows their key and value layouts; the pipeline assembles entries.

mod errors;
mod local;
mod session;

pub use errors::{WebStorageError, WebStorageResult};
pub use local::{
    decode_storage_string, decode_utf16_le, read_proto_varints, LocalStorageEntry,
    LocalStorageKey, OriginMetadata,
};
pub use session::{
    decode_session_value, parse_map_id, SessionStorageEntry, SessionStorageKey,
};
