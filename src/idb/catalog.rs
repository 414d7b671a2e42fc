//! Metadata catalog reconstruction
//!
//! A single pass over every raw record rebuilds the logical IndexedDB
//! schema: which databases exist, and for each database which object
//! stores exist and what they are called.
//!
//! # Read policy
//!
//! For every metadata key, only the raw record with the largest sequence
//! number counts. If that record is a deletion, the key is absent. Live
//! records with smaller sequence numbers are superseded either way.

use std::collections::BTreeMap;

use crate::leveldb::RawRecord;
use crate::pipeline::{EventCode, ExtractionReport, Stage};

use super::errors::KeyParseError;
use super::key::{
    decode_utf16_be, DatabaseMetaType, DatabaseNameKey, IndexedDbKey, ObjectStoreMetaType,
};
use super::varint::read_varint;

/// The winning raw write for one metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub value: Vec<u8>,
    pub sequence: u64,
    pub origin_file: String,
}

/// Tracks the highest-sequence record per key, tombstones included.
struct LatestWrites<'a, K: Ord> {
    latest: BTreeMap<K, &'a RawRecord>,
}

impl<'a, K: Ord> LatestWrites<'a, K> {
    fn new() -> Self {
        Self {
            latest: BTreeMap::new(),
        }
    }

    fn observe(&mut self, key: K, record: &'a RawRecord) {
        match self.latest.get(&key) {
            Some(current) if current.sequence >= record.sequence => {}
            _ => {
                self.latest.insert(key, record);
            }
        }
    }

    /// Drop keys whose latest write is a deletion.
    fn into_live(self) -> BTreeMap<K, ResolvedEntry> {
        self.latest
            .into_iter()
            .filter(|(_, record)| record.is_live())
            .map(|(key, record)| {
                (
                    key,
                    ResolvedEntry {
                        value: record.value.clone(),
                        sequence: record.sequence,
                        origin_file: record.origin_file.clone(),
                    },
                )
            })
            .collect()
    }
}

/// A logical database named in global metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseId {
    pub origin: String,
    pub name: String,
    /// `None` when the id value is empty or corrupt (a torn-down database)
    pub id: Option<u64>,
}

/// Global metadata: raw key → latest live entry, plus the database list
/// derived from `DatabaseName` entries.
#[derive(Debug, Clone, Default)]
pub struct GlobalMetadata {
    entries: BTreeMap<Vec<u8>, ResolvedEntry>,
    databases: Vec<DatabaseId>,
}

impl GlobalMetadata {
    fn from_entries(entries: BTreeMap<Vec<u8>, ResolvedEntry>) -> Self {
        let mut databases: Vec<DatabaseId> = entries
            .iter()
            .filter_map(|(key, entry)| {
                let name_key = DatabaseNameKey::parse(key).ok()?;
                let id = read_varint(&entry.value).ok().map(|(id, _)| id);
                Some(DatabaseId {
                    origin: name_key.origin,
                    name: name_key.name,
                    id,
                })
            })
            .collect();
        databases.sort_by(|a, b| (a.id, &a.name, &a.origin).cmp(&(b.id, &b.name, &b.origin)));

        Self { entries, databases }
    }

    pub fn get(&self, raw_key: &[u8]) -> Option<&ResolvedEntry> {
        self.entries.get(raw_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every database named in global metadata, sorted by id.
    pub fn databases(&self) -> &[DatabaseId] {
        &self.databases
    }

    /// Name of the database with the given id.
    pub fn database_name(&self, db_id: u64) -> Option<&str> {
        self.databases
            .iter()
            .find(|db| db.id == Some(db_id))
            .map(|db| db.name.as_str())
    }
}

/// Database-scoped metadata keyed by (db_id, meta_type).
#[derive(Debug, Clone, Default)]
pub struct DatabaseMetadata {
    entries: BTreeMap<(u64, DatabaseMetaType), ResolvedEntry>,
}

impl DatabaseMetadata {
    pub fn get(&self, db_id: u64, meta_type: DatabaseMetaType) -> Option<&ResolvedEntry> {
        self.entries.get(&(db_id, meta_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Upper bound of the object-store id range, if recorded and decodable.
    pub fn maximum_object_store_id(&self, db_id: u64) -> Option<u64> {
        self.get(db_id, DatabaseMetaType::MaximumObjectStoreId)
            .and_then(|entry| read_varint(&entry.value).ok())
            .map(|(id, _)| id)
    }
}

/// Object-store-scoped metadata keyed by (db_id, obj_store_id, meta_type).
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreMetadata {
    entries: BTreeMap<(u64, u64, ObjectStoreMetaType), ResolvedEntry>,
}

impl ObjectStoreMetadata {
    pub fn get(
        &self,
        db_id: u64,
        obj_store_id: u64,
        meta_type: ObjectStoreMetaType,
    ) -> Option<&ResolvedEntry> {
        self.entries.get(&(db_id, obj_store_id, meta_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store name, decoded from its UTF-16BE value.
    pub fn store_name(&self, db_id: u64, obj_store_id: u64) -> Option<String> {
        self.get(db_id, obj_store_id, ObjectStoreMetaType::StoreName)
            .map(|entry| decode_utf16_be(&entry.value))
    }

    /// Largest store id with any metadata in the given database.
    pub fn highest_store_id(&self, db_id: u64) -> Option<u64> {
        self.entries
            .keys()
            .filter(|(db, _, _)| *db == db_id)
            .map(|(_, store, _)| *store)
            .max()
    }
}

/// One object store of a database, as resolved by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreInfo {
    pub database_id: u64,
    pub object_store_id: u64,
    /// `None` when no live `StoreName` entry exists
    pub name: Option<String>,
}

/// Reconstructed IndexedDB schema.
#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    global: GlobalMetadata,
    databases: DatabaseMetadata,
    object_stores: ObjectStoreMetadata,
}

impl MetadataCatalog {
    /// Build the catalog, discarding per-record problems.
    pub fn build(records: &[RawRecord]) -> Self {
        let mut report = ExtractionReport::new();
        Self::build_with_report(records, &mut report)
    }

    /// Build the catalog, recording skipped metadata records in `report`.
    pub fn build_with_report(records: &[RawRecord], report: &mut ExtractionReport) -> Self {
        let mut global = LatestWrites::new();
        let mut databases = LatestWrites::new();
        let mut object_stores = LatestWrites::new();

        for record in records {
            report.metrics.raw_records += 1;
            match IndexedDbKey::parse(&record.key) {
                Ok(IndexedDbKey::GlobalMetadata { .. }) => {
                    report.metrics.metadata_records += 1;
                    global.observe(record.key.clone(), record);
                }
                Ok(IndexedDbKey::DatabaseMetadata { db_id, meta_type }) => {
                    report.metrics.metadata_records += 1;
                    databases.observe((db_id, meta_type), record);
                }
                Ok(IndexedDbKey::ObjectStoreMetadata {
                    db_id,
                    obj_store_id,
                    meta_type,
                }) => {
                    report.metrics.metadata_records += 1;
                    object_stores.observe((db_id, obj_store_id, meta_type), record);
                }
                // Data records belong to the classifier
                Ok(IndexedDbKey::Data { .. }) => {}
                Err(KeyParseError::Varint(err)) => {
                    report.record_skip(
                        Stage::Catalog,
                        EventCode::VarintError,
                        record,
                        format!("object store id: {}", err),
                    );
                }
                Err(_) => report.metrics.unclassified_keys += 1,
            }
        }

        Self {
            global: GlobalMetadata::from_entries(global.into_live()),
            databases: DatabaseMetadata {
                entries: databases.into_live(),
            },
            object_stores: ObjectStoreMetadata {
                entries: object_stores.into_live(),
            },
        }
    }

    pub fn global(&self) -> &GlobalMetadata {
        &self.global
    }

    pub fn database_metadata(&self) -> &DatabaseMetadata {
        &self.databases
    }

    pub fn object_store_metadata(&self) -> &ObjectStoreMetadata {
        &self.object_stores
    }

    pub fn into_parts(self) -> (GlobalMetadata, DatabaseMetadata, ObjectStoreMetadata) {
        (self.global, self.databases, self.object_stores)
    }

    /// Databases with a resolved id. Torn-down stubs are left out.
    pub fn resolved_databases(&self) -> impl Iterator<Item = (u64, &DatabaseId)> {
        self.global
            .databases()
            .iter()
            .filter_map(|db| db.id.map(|id| (id, db)))
    }

    /// Object stores `1..=MaximumObjectStoreId` of one database.
    ///
    /// Without a decodable `MaximumObjectStoreId` the range ends at the
    /// highest store id that has any metadata.
    pub fn object_stores(&self, db_id: u64) -> Vec<ObjectStoreInfo> {
        let upper = self
            .databases
            .maximum_object_store_id(db_id)
            .or_else(|| self.object_stores.highest_store_id(db_id))
            .unwrap_or(0);

        (1..=upper)
            .map(|store_id| ObjectStoreInfo {
                database_id: db_id,
                object_store_id: store_id,
                name: self.object_stores.store_name(db_id, store_id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idb::key::encode_utf16_be;

    fn db_name_record(name: &str, db_id: u8, seq: u64) -> RawRecord {
        let key = DatabaseNameKey {
            origin: "https_teams.microsoft.com_0@1".to_string(),
            name: name.to_string(),
        };
        RawRecord::live(key.encode(), vec![db_id], seq, "000005.ldb")
    }

    #[test]
    fn test_latest_live_write_wins() {
        let key = vec![0, 1, 0, 0, 3];
        let records = vec![
            RawRecord::live(key.clone(), vec![4], 10, "a.log"),
            RawRecord::live(key.clone(), vec![9], 30, "b.log"),
            RawRecord::live(key.clone(), vec![6], 20, "c.log"),
        ];
        let catalog = MetadataCatalog::build(&records);
        let entry = catalog
            .database_metadata()
            .get(1, DatabaseMetaType::MaximumObjectStoreId)
            .unwrap();
        assert_eq!(entry.value, vec![9]);
        assert_eq!(entry.sequence, 30);
        assert_eq!(entry.origin_file, "b.log");
    }

    #[test]
    fn test_newer_deletion_hides_key() {
        let key = vec![0, 1, 0, 0, 3];
        let records = vec![
            RawRecord::live(key.clone(), vec![4], 10, "a.log"),
            RawRecord::deleted(key.clone(), 11, "a.log"),
        ];
        let catalog = MetadataCatalog::build(&records);
        assert!(catalog
            .database_metadata()
            .get(1, DatabaseMetaType::MaximumObjectStoreId)
            .is_none());
    }

    #[test]
    fn test_older_deletion_is_superseded() {
        let key = vec![0, 1, 0, 0, 3];
        let records = vec![
            RawRecord::deleted(key.clone(), 5, "a.log"),
            RawRecord::live(key.clone(), vec![4], 10, "a.log"),
        ];
        let catalog = MetadataCatalog::build(&records);
        assert_eq!(catalog.database_metadata().maximum_object_store_id(1), Some(4));
    }

    #[test]
    fn test_databases_from_global_metadata() {
        let records = vec![
            db_name_record("Teams:replychain-manager", 5, 1),
            db_name_record("Teams:conversation-manager", 2, 2),
        ];
        let catalog = MetadataCatalog::build(&records);
        let dbs = catalog.global().databases();
        assert_eq!(dbs.len(), 2);
        assert_eq!(dbs[0].id, Some(2));
        assert_eq!(dbs[1].name, "Teams:replychain-manager");
        assert_eq!(catalog.global().database_name(5), Some("Teams:replychain-manager"));
    }

    #[test]
    fn test_database_with_unreadable_id_is_unresolved() {
        let key = DatabaseNameKey {
            origin: "o".to_string(),
            name: "stub".to_string(),
        };
        let records = vec![RawRecord::live(key.encode(), Vec::new(), 1, "x.log")];
        let catalog = MetadataCatalog::build(&records);
        assert_eq!(catalog.global().databases()[0].id, None);
        assert_eq!(catalog.resolved_databases().count(), 0);
    }

    #[test]
    fn test_object_store_names_and_range() {
        let records = vec![
            RawRecord::live(vec![0, 1, 0, 0, 3], vec![2], 1, "a.log"),
            RawRecord::live(
                vec![0, 1, 0, 0, 0x32, 1, 0],
                encode_utf16_be("people"),
                2,
                "a.log",
            ),
            RawRecord::live(
                vec![0, 1, 0, 0, 0x32, 2, 0],
                encode_utf16_be("replychains"),
                3,
                "a.log",
            ),
            // beyond MaximumObjectStoreId, not part of the range
            RawRecord::live(
                vec![0, 1, 0, 0, 0x32, 3, 0],
                encode_utf16_be("stale"),
                4,
                "a.log",
            ),
        ];
        let catalog = MetadataCatalog::build(&records);
        let stores = catalog.object_stores(1);
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[0].name.as_deref(), Some("people"));
        assert_eq!(stores[1].name.as_deref(), Some("replychains"));
    }

    #[test]
    fn test_range_falls_back_to_highest_store_metadata() {
        let records = vec![RawRecord::live(
            vec![0, 1, 0, 0, 0x32, 3, 0],
            encode_utf16_be("buddylist"),
            1,
            "a.log",
        )];
        let catalog = MetadataCatalog::build(&records);
        let stores = catalog.object_stores(1);
        assert_eq!(stores.len(), 3);
        assert_eq!(stores[0].name, None);
        assert_eq!(stores[2].name.as_deref(), Some("buddylist"));
    }

    #[test]
    fn test_corrupt_store_id_is_reported_not_fatal() {
        let records = vec![
            RawRecord::live(vec![0, 1, 0, 0, 0x32, 0x80], vec![0], 1, "a.log"),
            RawRecord::live(vec![0, 1, 0, 0, 3], vec![1], 2, "a.log"),
        ];
        let mut report = ExtractionReport::new();
        let catalog = MetadataCatalog::build_with_report(&records, &mut report);
        assert_eq!(catalog.database_metadata().maximum_object_store_id(1), Some(1));
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.events()[0].code, EventCode::VarintError);
    }
}
