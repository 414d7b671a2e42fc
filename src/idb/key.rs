//! IndexedDB key layout
//!
//! Every key in the backing store starts with a `KeyPrefix`:
//!
//! ```text
//! +-----------------------------------------------+
//! | lengths byte                                  |
//! |   bits 7..5  database_id bytes - 1            |
//! |   bits 4..2  object_store_id bytes - 1        |
//! |   bits 1..0  index_id bytes - 1               |
//! +-----------------------------------------------+
//! | database_id      (little-endian)              |
//! | object_store_id  (little-endian)              |
//! | index_id         (little-endian)              |
//! +-----------------------------------------------+
//! ```
//!
//! With single-byte ids this is `00 <db> <store> <index>`. The prefix
//! decides the key kind:
//!
//! - `(0, 0, 0)`: global metadata
//! - `(db, 0, 0)` then `0x32 <varint store> <type>`: object-store metadata
//! - `(db, 0, 0)` then `<type>`: database metadata
//! - `(db, store, 1)`: object-store data, followed by the user key

use std::fmt;

use super::errors::KeyParseError;
use super::varint::{read_varint_at, write_varint};

/// Meta-type byte introducing object-store metadata inside database metadata.
pub const OBJECT_STORE_META_TAG: u8 = 0x32;

/// Global meta-type byte for database name entries.
pub const DATABASE_NAME_TAG: u8 = 0xC9;

/// Index id marking object-store data records.
pub const OBJECT_STORE_DATA_INDEX_ID: u64 = 1;

/// Decoded key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPrefix {
    pub database_id: u64,
    pub object_store_id: u64,
    pub index_id: u64,
}

impl KeyPrefix {
    pub fn new(database_id: u64, object_store_id: u64, index_id: u64) -> Self {
        Self {
            database_id,
            object_store_id,
            index_id,
        }
    }

    /// Prefix of every data record in one object store.
    pub fn data(database_id: u64, object_store_id: u64) -> Self {
        Self::new(database_id, object_store_id, OBJECT_STORE_DATA_INDEX_ID)
    }

    /// Parse a prefix from the start of `key`, returning it and its length.
    pub fn parse(key: &[u8]) -> Result<(Self, usize), KeyParseError> {
        let lengths = *key.first().ok_or(KeyParseError::Empty)?;
        let db_len = ((lengths >> 5) + 1) as usize;
        let store_len = (((lengths >> 2) & 0x07) + 1) as usize;
        let index_len = ((lengths & 0x03) + 1) as usize;

        let needed = 1 + db_len + store_len + index_len;
        if key.len() < needed {
            return Err(KeyParseError::TruncatedPrefix {
                needed,
                available: key.len(),
            });
        }

        let mut pos = 1;
        let database_id = read_le(&key[pos..pos + db_len]);
        pos += db_len;
        let object_store_id = read_le(&key[pos..pos + store_len]);
        pos += store_len;
        let index_id = read_le(&key[pos..pos + index_len]);

        Ok((Self::new(database_id, object_store_id, index_id), needed))
    }

    /// Encode using the minimal byte width for every id.
    pub fn encode(&self) -> Vec<u8> {
        let db = le_minimal(self.database_id, 8);
        let store = le_minimal(self.object_store_id, 8);
        let index = le_minimal(self.index_id, 4);

        let lengths =
            (((db.len() - 1) as u8) << 5) | (((store.len() - 1) as u8) << 2) | (index.len() - 1) as u8;

        let mut out = Vec::with_capacity(1 + db.len() + store.len() + index.len());
        out.push(lengths);
        out.extend_from_slice(&db);
        out.extend_from_slice(&store);
        out.extend_from_slice(&index);
        out
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        self.database_id == 0 && self.object_store_id == 0 && self.index_id == 0
    }

    #[inline]
    pub fn is_database_scope(&self) -> bool {
        self.database_id != 0 && self.object_store_id == 0 && self.index_id == 0
    }

    #[inline]
    pub fn is_object_store_data(&self) -> bool {
        self.database_id != 0
            && self.object_store_id != 0
            && self.index_id == OBJECT_STORE_DATA_INDEX_ID
    }
}

fn read_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn le_minimal(value: u64, max_len: usize) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    bytes.truncate(max_len);
    while bytes.len() > 1 && bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

/// Database-scoped metadata entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatabaseMetaType {
    OriginName,
    DatabaseName,
    IdbVersionString,
    MaximumObjectStoreId,
    IdbVersion,
    BlobNumberGeneratorCurrentNumber,
    Other(u8),
}

impl DatabaseMetaType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::OriginName,
            1 => Self::DatabaseName,
            2 => Self::IdbVersionString,
            3 => Self::MaximumObjectStoreId,
            4 => Self::IdbVersion,
            5 => Self::BlobNumberGeneratorCurrentNumber,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::OriginName => 0,
            Self::DatabaseName => 1,
            Self::IdbVersionString => 2,
            Self::MaximumObjectStoreId => 3,
            Self::IdbVersion => 4,
            Self::BlobNumberGeneratorCurrentNumber => 5,
            Self::Other(b) => *b,
        }
    }
}

/// Object-store-scoped metadata entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectStoreMetaType {
    StoreName,
    KeyPath,
    AutoIncrement,
    IsEvictable,
    LastVersion,
    MaximumIndexId,
    HasKeyPath,
    KeyGeneratorCurrentNumber,
    Other(u8),
}

impl ObjectStoreMetaType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::StoreName,
            1 => Self::KeyPath,
            2 => Self::AutoIncrement,
            3 => Self::IsEvictable,
            4 => Self::LastVersion,
            5 => Self::MaximumIndexId,
            6 => Self::HasKeyPath,
            7 => Self::KeyGeneratorCurrentNumber,
            other => Self::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::StoreName => 0,
            Self::KeyPath => 1,
            Self::AutoIncrement => 2,
            Self::IsEvictable => 3,
            Self::LastVersion => 4,
            Self::MaximumIndexId => 5,
            Self::HasKeyPath => 6,
            Self::KeyGeneratorCurrentNumber => 7,
            Self::Other(b) => *b,
        }
    }
}

/// A classified backing-store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexedDbKey {
    /// Global metadata; `meta_type` is the byte after the prefix (if any)
    GlobalMetadata { meta_type: Option<u8> },
    DatabaseMetadata {
        db_id: u64,
        meta_type: DatabaseMetaType,
    },
    ObjectStoreMetadata {
        db_id: u64,
        obj_store_id: u64,
        meta_type: ObjectStoreMetaType,
    },
    Data {
        db_id: u64,
        obj_store_id: u64,
        user_key: Vec<u8>,
    },
}

impl IndexedDbKey {
    /// Classify a raw key.
    ///
    /// Keys of other shapes (index data, free lists, name indexes) yield
    /// `KeyParseError::UnknownShape`.
    pub fn parse(key: &[u8]) -> Result<Self, KeyParseError> {
        let (prefix, prefix_len) = KeyPrefix::parse(key)?;
        let rest = &key[prefix_len..];

        if prefix.is_global() {
            return Ok(IndexedDbKey::GlobalMetadata {
                meta_type: rest.first().copied(),
            });
        }

        if prefix.is_database_scope() {
            let tag = *rest.first().ok_or(KeyParseError::MissingMetaType)?;
            if tag == OBJECT_STORE_META_TAG {
                let (obj_store_id, used) = read_varint_at(key, prefix_len + 1)?;
                let meta_pos = prefix_len + 1 + used;
                let meta = *key.get(meta_pos).ok_or(KeyParseError::MissingMetaType)?;
                return Ok(IndexedDbKey::ObjectStoreMetadata {
                    db_id: prefix.database_id,
                    obj_store_id,
                    meta_type: ObjectStoreMetaType::from_byte(meta),
                });
            }
            if tag < OBJECT_STORE_META_TAG {
                return Ok(IndexedDbKey::DatabaseMetadata {
                    db_id: prefix.database_id,
                    meta_type: DatabaseMetaType::from_byte(tag),
                });
            }
            return Err(KeyParseError::UnknownShape);
        }

        if prefix.is_object_store_data() {
            return Ok(IndexedDbKey::Data {
                db_id: prefix.database_id,
                obj_store_id: prefix.object_store_id,
                user_key: rest.to_vec(),
            });
        }

        Err(KeyParseError::UnknownShape)
    }
}

/// Key of a global `DatabaseName` entry: the origin and the database name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DatabaseNameKey {
    pub origin: String,
    pub name: String,
}

impl DatabaseNameKey {
    /// Parse `<prefix> C9 <StringWithLength origin> <StringWithLength name>`.
    pub fn parse(key: &[u8]) -> Result<Self, KeyParseError> {
        let (prefix, prefix_len) = KeyPrefix::parse(key)?;
        if !prefix.is_global() || key.get(prefix_len) != Some(&DATABASE_NAME_TAG) {
            return Err(KeyParseError::UnknownShape);
        }
        let (origin, used) = read_string_with_length(key, prefix_len + 1)?;
        let (name, _) = read_string_with_length(key, prefix_len + 1 + used)?;
        Ok(Self { origin, name })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = KeyPrefix::new(0, 0, 0).encode();
        out.push(DATABASE_NAME_TAG);
        write_string_with_length(&self.origin, &mut out);
        write_string_with_length(&self.name, &mut out);
        out
    }
}

/// Decode a UTF-16BE byte string. A trailing odd byte is ignored.
pub fn decode_utf16_be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

pub fn encode_utf16_be(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
}

/// Read a varint code-unit count followed by that many UTF-16BE units.
/// Returns the string and the number of bytes consumed.
pub fn read_string_with_length(data: &[u8], offset: usize) -> Result<(String, usize), KeyParseError> {
    let (units, used) = read_varint_at(data, offset)?;
    let start = offset + used;
    let byte_len = (units as usize)
        .checked_mul(2)
        .ok_or(KeyParseError::TruncatedString { offset })?;
    let end = start
        .checked_add(byte_len)
        .filter(|end| *end <= data.len())
        .ok_or(KeyParseError::TruncatedString { offset })?;
    Ok((decode_utf16_be(&data[start..end]), used + byte_len))
}

pub fn write_string_with_length(s: &str, out: &mut Vec<u8>) {
    let encoded = encode_utf16_be(s);
    write_varint((encoded.len() / 2) as u64, out);
    out.extend_from_slice(&encoded);
}

/// Decoded IndexedDB user key.
#[derive(Debug, Clone, PartialEq)]
pub enum IdbKey {
    Null,
    String(String),
    Date(f64),
    Number(f64),
    Array(Vec<IdbKey>),
    MinKey,
    Binary(Vec<u8>),
}

impl IdbKey {
    /// Parse an encoded user key, returning it and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), KeyParseError> {
        Self::parse_at(data, 0)
    }

    fn parse_at(data: &[u8], offset: usize) -> Result<(Self, usize), KeyParseError> {
        let type_byte = *data
            .get(offset)
            .ok_or(KeyParseError::TruncatedString { offset })?;
        let body = offset + 1;

        match type_byte {
            0 => Ok((IdbKey::Null, 1)),
            1 => {
                let (s, used) = read_string_with_length(data, body)?;
                Ok((IdbKey::String(s), 1 + used))
            }
            2 | 3 => {
                let bytes = data
                    .get(body..body + 8)
                    .ok_or(KeyParseError::TruncatedString { offset: body })?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                let n = f64::from_le_bytes(buf);
                let key = if type_byte == 2 {
                    IdbKey::Date(n)
                } else {
                    IdbKey::Number(n)
                };
                Ok((key, 9))
            }
            4 => {
                let (count, used) = read_varint_at(data, body)?;
                let mut pos = body + used;
                let mut items = Vec::new();
                for _ in 0..count {
                    let (item, item_len) = Self::parse_at(data, pos)?;
                    items.push(item);
                    pos += item_len;
                }
                Ok((IdbKey::Array(items), pos - offset))
            }
            5 => Ok((IdbKey::MinKey, 1)),
            6 => {
                let (len, used) = read_varint_at(data, body)?;
                let start = body + used;
                let end = start
                    .checked_add(len as usize)
                    .filter(|end| *end <= data.len())
                    .ok_or(KeyParseError::TruncatedString { offset: body })?;
                Ok((IdbKey::Binary(data[start..end].to_vec()), end - offset))
            }
            other => Err(KeyParseError::UnknownKeyType(other)),
        }
    }
}

impl fmt::Display for IdbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdbKey::Null => write!(f, "null"),
            IdbKey::String(s) => write!(f, "{}", s),
            IdbKey::Date(ms) => write!(f, "Date({})", ms),
            IdbKey::Number(n) => write!(f, "{}", n),
            IdbKey::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            IdbKey::MinKey => write!(f, "MinKey"),
            IdbKey::Binary(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

/// The application key of a data record: raw bytes plus the decoded form
/// when the bytes are a well-formed IndexedDB key.
#[derive(Debug, Clone, PartialEq)]
pub struct UserKey {
    pub raw: Vec<u8>,
    pub decoded: Option<IdbKey>,
}

impl UserKey {
    pub fn from_raw(raw: &[u8]) -> Self {
        Self {
            raw: raw.to_vec(),
            decoded: IdbKey::parse(raw).ok().map(|(key, _)| key),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.decoded {
            Some(key) => write!(f, "{}", key),
            None => write!(f, "0x{}", hex::encode(&self.raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idb::errors::VarintError;

    #[test]
    fn test_single_byte_prefix_layout() {
        let prefix = KeyPrefix::data(5, 2);
        assert_eq!(prefix.encode(), vec![0x00, 0x05, 0x02, 0x01]);
        assert_eq!(KeyPrefix::parse(&[0x00, 0x05, 0x02, 0x01, 0xAA]).unwrap(), (prefix, 4));
    }

    #[test]
    fn test_wide_prefix() {
        let prefix = KeyPrefix::new(0x0102, 0x030405, 1);
        let encoded = prefix.encode();
        assert_eq!(encoded[0], (1 << 5) | (2 << 2));
        assert_eq!(KeyPrefix::parse(&encoded).unwrap(), (prefix, encoded.len()));
    }

    #[test]
    fn test_truncated_prefix() {
        assert_eq!(
            KeyPrefix::parse(&[0x00, 0x05]),
            Err(KeyParseError::TruncatedPrefix {
                needed: 4,
                available: 2
            })
        );
        assert_eq!(KeyPrefix::parse(&[]), Err(KeyParseError::Empty));
    }

    #[test]
    fn test_classify_global() {
        let key = IndexedDbKey::parse(&[0, 0, 0, 0, 0xC9, 0x00]).unwrap();
        assert_eq!(key, IndexedDbKey::GlobalMetadata { meta_type: Some(0xC9) });
    }

    #[test]
    fn test_classify_database_metadata() {
        let key = IndexedDbKey::parse(&[0, 5, 0, 0, 3]).unwrap();
        assert_eq!(
            key,
            IndexedDbKey::DatabaseMetadata {
                db_id: 5,
                meta_type: DatabaseMetaType::MaximumObjectStoreId
            }
        );
    }

    #[test]
    fn test_classify_object_store_metadata() {
        let key = IndexedDbKey::parse(&[0, 5, 0, 0, 0x32, 0x07, 0x00]).unwrap();
        assert_eq!(
            key,
            IndexedDbKey::ObjectStoreMetadata {
                db_id: 5,
                obj_store_id: 7,
                meta_type: ObjectStoreMetaType::StoreName
            }
        );
    }

    #[test]
    fn test_object_store_metadata_bad_varint() {
        let err = IndexedDbKey::parse(&[0, 5, 0, 0, 0x32, 0x80]).unwrap_err();
        assert_eq!(err, KeyParseError::Varint(VarintError::Truncated { offset: 5 }));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_classify_data() {
        let key = IndexedDbKey::parse(&[0, 5, 2, 1, 1, 0]).unwrap();
        assert_eq!(
            key,
            IndexedDbKey::Data {
                db_id: 5,
                obj_store_id: 2,
                user_key: vec![1, 0]
            }
        );
    }

    #[test]
    fn test_index_data_is_unknown_shape() {
        assert_eq!(
            IndexedDbKey::parse(&[0, 5, 2, 30, 1]),
            Err(KeyParseError::UnknownShape)
        );
        // Object store names index inside database scope
        assert_eq!(
            IndexedDbKey::parse(&[0, 5, 0, 0, 54]),
            Err(KeyParseError::UnknownShape)
        );
    }

    #[test]
    fn test_database_name_key() {
        let key = DatabaseNameKey {
            origin: "https_teams.microsoft.com_0@1".to_string(),
            name: "Teams:replychain-manager".to_string(),
        };
        let encoded = key.encode();
        assert_eq!(&encoded[..5], &[0, 0, 0, 0, 0xC9]);
        assert_eq!(DatabaseNameKey::parse(&encoded).unwrap(), key);
    }

    #[test]
    fn test_string_with_length_truncated() {
        // claims 4 code units, provides 1
        let data = [0x04, 0x00, 0x61];
        assert_eq!(
            read_string_with_length(&data, 0),
            Err(KeyParseError::TruncatedString { offset: 0 })
        );
    }

    #[test]
    fn test_user_key_string() {
        let mut raw = vec![1u8];
        write_string_with_length("conv-1", &mut raw);
        let key = UserKey::from_raw(&raw);
        assert_eq!(key.decoded, Some(IdbKey::String("conv-1".to_string())));
        assert_eq!(key.to_string(), "conv-1");
    }

    #[test]
    fn test_user_key_array_and_number() {
        let mut raw = vec![4u8, 2, 3];
        raw.extend_from_slice(&42.0f64.to_le_bytes());
        raw.push(0);
        let (key, used) = IdbKey::parse(&raw).unwrap();
        assert_eq!(used, raw.len());
        assert_eq!(key, IdbKey::Array(vec![IdbKey::Number(42.0), IdbKey::Null]));
    }

    #[test]
    fn test_undecodable_user_key_renders_hex() {
        let key = UserKey::from_raw(&[0x99, 0x01]);
        assert!(key.decoded.is_none());
        assert_eq!(key.to_string(), "0x9901");
    }
}
