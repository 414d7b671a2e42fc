//! Session storage layout
//!
//! ```text
//! version                               -> "1"
//! next-map-id                           -> decimal
//! namespace-<36-char id>-<origin>       -> decimal map id
//! map-<map id>-<key, UTF-8>             -> value, UTF-16LE
//! ```
//!
//! A namespace is one browsing session. Several namespaces may share a map
//! until one of them writes, so the link from a value to its host goes
//! through the namespace records.

use serde::Serialize;

use super::errors::{WebStorageError, WebStorageResult};
use super::local::decode_utf16_le;

pub const VERSION_KEY: &[u8] = b"version";
pub const NEXT_MAP_ID_KEY: &[u8] = b"next-map-id";
pub const NAMESPACE_PREFIX: &[u8] = b"namespace-";
pub const MAP_PREFIX: &[u8] = b"map-";

const NAMESPACE_ID_LEN: usize = 36;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStorageKey {
    Version,
    NextMapId,
    Namespace { guid: String, host: String },
    MapEntry { map_id: u64, key: String },
}

impl SessionStorageKey {
    pub fn parse(key: &[u8]) -> WebStorageResult<Self> {
        if key == VERSION_KEY {
            return Ok(SessionStorageKey::Version);
        }
        if key == NEXT_MAP_ID_KEY {
            return Ok(SessionStorageKey::NextMapId);
        }
        if let Some(rest) = key.strip_prefix(NAMESPACE_PREFIX) {
            if rest.len() <= NAMESPACE_ID_LEN || rest[NAMESPACE_ID_LEN] != b'-' {
                return Err(WebStorageError::MalformedNamespace);
            }
            return Ok(SessionStorageKey::Namespace {
                guid: String::from_utf8_lossy(&rest[..NAMESPACE_ID_LEN]).into_owned(),
                host: String::from_utf8_lossy(&rest[NAMESPACE_ID_LEN + 1..]).into_owned(),
            });
        }
        if let Some(rest) = key.strip_prefix(MAP_PREFIX) {
            let dash = rest
                .iter()
                .position(|&b| b == b'-')
                .ok_or_else(|| WebStorageError::InvalidMapId(lossy(rest)))?;
            return Ok(SessionStorageKey::MapEntry {
                map_id: parse_map_id(&rest[..dash])?,
                key: lossy(&rest[dash + 1..]),
            });
        }
        Err(WebStorageError::UnknownKey)
    }
}

/// Decimal map id, as stored in namespace values and map keys.
pub fn parse_map_id(bytes: &[u8]) -> WebStorageResult<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| WebStorageError::InvalidMapId(lossy(bytes)))
}

/// Session storage values carry no encoding byte.
pub fn decode_session_value(bytes: &[u8]) -> WebStorageResult<String> {
    decode_utf16_le(bytes)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// One version of one session storage item, attributed to the session that
/// referenced its map. `host` and `guid` are `None` when no namespace
/// record points at the map any more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStorageEntry {
    pub host: Option<String>,
    pub guid: Option<String>,
    pub key: String,
    pub value: String,
    pub leveldb_sequence_number: u64,
    pub origin_file: String,
}
