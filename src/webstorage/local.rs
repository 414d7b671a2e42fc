//! Local storage layout
//!
//! ```text
//! VERSION                         -> "1"
//! META:<origin>                   -> protobuf { 1: last_modified, 2: size_bytes }
//! METAACCESS:<origin>             -> protobuf { 1: last_accessed }
//! _<origin> 0x00 <encoded key>    -> <encoded value>
//! ```
//!
//! Encoded strings start with one byte naming the encoding: `0x00` for
//! UTF-16LE, `0x01` for Latin-1.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::idb::read_varint_at;
use crate::reconcile::format_windows_micros;

use super::errors::{WebStorageError, WebStorageResult};

pub const VERSION_KEY: &[u8] = b"VERSION";
pub const META_PREFIX: &[u8] = b"META:";
pub const META_ACCESS_PREFIX: &[u8] = b"METAACCESS:";
pub const DATA_PREFIX: u8 = b'_';

const ENCODING_UTF16_LE: u8 = 0x00;
const ENCODING_LATIN1: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalStorageKey {
    Version,
    Meta { origin: String },
    MetaAccess { origin: String },
    Data { origin: String, key: String },
}

impl LocalStorageKey {
    pub fn parse(key: &[u8]) -> WebStorageResult<Self> {
        if key == VERSION_KEY {
            return Ok(LocalStorageKey::Version);
        }
        if let Some(origin) = key.strip_prefix(META_ACCESS_PREFIX) {
            return Ok(LocalStorageKey::MetaAccess {
                origin: String::from_utf8_lossy(origin).into_owned(),
            });
        }
        if let Some(origin) = key.strip_prefix(META_PREFIX) {
            return Ok(LocalStorageKey::Meta {
                origin: String::from_utf8_lossy(origin).into_owned(),
            });
        }
        match key.split_first() {
            Some((&DATA_PREFIX, rest)) => {
                let nul = rest
                    .iter()
                    .position(|&b| b == 0x00)
                    .ok_or(WebStorageError::MissingOriginTerminator)?;
                Ok(LocalStorageKey::Data {
                    origin: String::from_utf8_lossy(&rest[..nul]).into_owned(),
                    key: decode_storage_string(&rest[nul + 1..])?,
                })
            }
            _ => Err(WebStorageError::UnknownKey),
        }
    }
}

/// Decode a script key or value with its leading encoding byte.
pub fn decode_storage_string(bytes: &[u8]) -> WebStorageResult<String> {
    let (&encoding, body) = bytes.split_first().ok_or(WebStorageError::EmptyString)?;
    match encoding {
        ENCODING_UTF16_LE => decode_utf16_le(body),
        ENCODING_LATIN1 => Ok(body.iter().map(|&b| b as char).collect()),
        other => Err(WebStorageError::UnknownEncoding(other)),
    }
}

/// Unpaired surrogates become U+FFFD.
pub fn decode_utf16_le(bytes: &[u8]) -> WebStorageResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(WebStorageError::OddUtf16Length(bytes.len()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Varint fields of a flat protobuf message, by field number.
///
/// Length-delimited and fixed-width fields are skipped.
pub fn read_proto_varints(bytes: &[u8]) -> WebStorageResult<BTreeMap<u64, u64>> {
    let mut fields = BTreeMap::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let (tag, used) = read_varint_at(bytes, pos)?;
        pos += used;
        let skip = match (tag & 0x07) as u8 {
            0 => {
                let (value, used) = read_varint_at(bytes, pos)?;
                fields.insert(tag >> 3, value);
                used
            }
            1 => 8,
            2 => {
                let (len, used) = read_varint_at(bytes, pos)?;
                usize::try_from(len)
                    .ok()
                    .and_then(|len| len.checked_add(used))
                    .ok_or(WebStorageError::TruncatedField(pos))?
            }
            5 => 4,
            other => return Err(WebStorageError::UnsupportedWireType(other)),
        };
        if skip > bytes.len() - pos {
            return Err(WebStorageError::TruncatedField(pos));
        }
        pos += skip;
    }
    Ok(fields)
}

/// What `META:` and `METAACCESS:` entries say about one origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OriginMetadata {
    pub origin: String,
    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(rename = "lastAccessed", skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    #[serde(rename = "sizeBytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl OriginMetadata {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    pub fn apply_meta(&mut self, value: &[u8]) -> WebStorageResult<()> {
        let fields = read_proto_varints(value)?;
        if let Some(&time) = fields.get(&1) {
            self.last_modified = format_windows_micros(time as i64);
        }
        if let Some(&size) = fields.get(&2) {
            self.size_bytes = Some(size);
        }
        Ok(())
    }

    pub fn apply_meta_access(&mut self, value: &[u8]) -> WebStorageResult<()> {
        let fields = read_proto_varints(value)?;
        if let Some(&time) = fields.get(&1) {
            self.last_accessed = format_windows_micros(time as i64);
        }
        Ok(())
    }
}

/// One version of one local storage item.
///
/// `value` is the stored string parsed as JSON; items whose value is not
/// JSON are reported and left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalStorageEntry {
    pub origin: String,
    pub key: String,
    pub value: Value,
    pub leveldb_sequence_number: u64,
    pub origin_file: String,
}
