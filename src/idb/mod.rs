//! IndexedDB logical layer over raw LevelDB records
//!
//! - `key`: key prefix decoding and key-shape classification
//! - `catalog`: databases, object stores and store names, resolved with
//!   "most recent write wins"
//! - `classify`: data records of the wanted stores, ready for value decoding

mod catalog;
mod classify;
mod errors;
mod key;
mod varint;

pub use catalog::{
    DatabaseId, DatabaseMetadata, GlobalMetadata, MetadataCatalog, ObjectStoreInfo,
    ObjectStoreMetadata, ResolvedEntry,
};
pub use classify::{classify, ClassifiedRecord, StoreFilter};
pub use errors::{KeyParseError, VarintError};
pub use key::{
    decode_utf16_be, encode_utf16_be, read_string_with_length, write_string_with_length,
    DatabaseMetaType, DatabaseNameKey, IdbKey, IndexedDbKey, KeyPrefix, ObjectStoreMetaType,
    UserKey, DATABASE_NAME_TAG, OBJECT_STORE_DATA_INDEX_ID, OBJECT_STORE_META_TAG,
};
pub use varint::{read_varint, read_varint_at, write_varint};
