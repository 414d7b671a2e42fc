//! Data record classification
//!
//! Given a built catalog, a second pass over the raw records picks out the
//! object-store data records (`00 <db> <store> 01 <user key>`), attaches
//! the store name, and drops stores outside the caller's interest set.
//!
//! Values are not decoded here. A `ClassifiedRecord` borrows the raw
//! record, so this pass allocates only for the user key.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::leveldb::RawRecord;
use crate::pipeline::{EventCode, ExtractionReport};

use super::catalog::MetadataCatalog;
use super::key::{IndexedDbKey, UserKey};

/// Which object stores proceed past classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFilter {
    /// Every store, named or not
    All,
    /// Only stores whose name is in the set
    Only(BTreeSet<String>),
}

impl StoreFilter {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StoreFilter::Only(names.into_iter().map(Into::into).collect())
    }

    /// Unnamed stores only pass an unfiltered run.
    pub fn accepts(&self, name: Option<&str>) -> bool {
        match (self, name) {
            (StoreFilter::All, _) => true,
            (StoreFilter::Only(names), Some(name)) => names.contains(name),
            (StoreFilter::Only(_), None) => false,
        }
    }
}

/// A data record resolved to its database and object store, value still raw.
#[derive(Debug, Clone)]
pub struct ClassifiedRecord<'a> {
    pub database_id: u64,
    pub object_store_id: u64,
    pub store_name: Option<String>,
    pub user_key: UserKey,
    pub raw: &'a RawRecord,
}

impl<'a> ClassifiedRecord<'a> {
    /// Value bytes, or `None` for empty values (deletions, stubs).
    pub fn value(&self) -> Option<&'a [u8]> {
        let raw: &'a RawRecord = self.raw;
        if raw.value.is_empty() {
            None
        } else {
            Some(&raw.value)
        }
    }
}

/// Select the data records of wanted stores.
///
/// Output is grouped by (database id, store id) ascending; within a store,
/// raw-record order is preserved.
pub fn classify<'a>(
    records: &'a [RawRecord],
    catalog: &MetadataCatalog,
    filter: &StoreFilter,
    report: &mut ExtractionReport,
) -> Vec<ClassifiedRecord<'a>> {
    let mut wanted: HashMap<(u64, u64), Option<String>> = HashMap::new();

    for (db_id, _) in catalog.resolved_databases() {
        for store in catalog.object_stores(db_id) {
            if store.name.is_none() {
                report.record_store_issue(
                    EventCode::MetadataInconsistency,
                    db_id,
                    store.object_store_id,
                    "object store has no resolvable name",
                );
            }
            if filter.accepts(store.name.as_deref()) {
                wanted.insert((db_id, store.object_store_id), store.name);
            }
        }
    }

    let mut grouped: BTreeMap<(u64, u64), Vec<ClassifiedRecord<'a>>> = BTreeMap::new();

    for record in records {
        let (db_id, obj_store_id, user_key) = match IndexedDbKey::parse(&record.key) {
            Ok(IndexedDbKey::Data {
                db_id,
                obj_store_id,
                user_key,
            }) => (db_id, obj_store_id, user_key),
            _ => continue,
        };

        let store_name = match wanted.get(&(db_id, obj_store_id)) {
            Some(name) => name.clone(),
            None => continue,
        };

        grouped
            .entry((db_id, obj_store_id))
            .or_default()
            .push(ClassifiedRecord {
                database_id: db_id,
                object_store_id: obj_store_id,
                store_name,
                user_key: UserKey::from_raw(&user_key),
                raw: record,
            });
    }

    let classified: Vec<ClassifiedRecord<'a>> = grouped.into_values().flatten().collect();
    for record in &classified {
        report.metrics.count_data_record(record.store_name.as_deref());
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idb::key::{encode_utf16_be, DatabaseNameKey};

    fn catalog_records() -> Vec<RawRecord> {
        let db_key = DatabaseNameKey {
            origin: "https_teams.microsoft.com_0@1".to_string(),
            name: "Teams:replychain-manager".to_string(),
        };
        vec![
            RawRecord::live(db_key.encode(), vec![5], 1, "a.log"),
            RawRecord::live(vec![0, 5, 0, 0, 3], vec![3], 2, "a.log"),
            RawRecord::live(vec![0, 5, 0, 0, 0x32, 1, 0], encode_utf16_be("people"), 3, "a.log"),
            RawRecord::live(
                vec![0, 5, 0, 0, 0x32, 2, 0],
                encode_utf16_be("replychains"),
                4,
                "a.log",
            ),
        ]
    }

    #[test]
    fn test_filter_accepts() {
        let filter = StoreFilter::only(["people"]);
        assert!(filter.accepts(Some("people")));
        assert!(!filter.accepts(Some("replychains")));
        assert!(!filter.accepts(None));
        assert!(StoreFilter::All.accepts(None));
    }

    #[test]
    fn test_classify_resolves_store_names() {
        let mut records = catalog_records();
        records.push(RawRecord::live(vec![0, 5, 2, 1, 0], vec![1, 2, 3], 10, "b.ldb"));
        records.push(RawRecord::live(vec![0, 5, 1, 1, 0], vec![4], 11, "b.ldb"));
        // index data is not a data record
        records.push(RawRecord::live(vec![0, 5, 2, 30, 0], vec![4], 12, "b.ldb"));

        let catalog = MetadataCatalog::build(&records);
        let mut report = ExtractionReport::new();
        let classified = classify(&records, &catalog, &StoreFilter::All, &mut report);

        assert_eq!(classified.len(), 2);
        // grouped by store id
        assert_eq!(classified[0].store_name.as_deref(), Some("people"));
        assert_eq!(classified[1].store_name.as_deref(), Some("replychains"));
        assert_eq!(classified[1].value(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_filter_drops_unwanted_stores() {
        let mut records = catalog_records();
        records.push(RawRecord::live(vec![0, 5, 2, 1, 0], vec![1], 10, "b.ldb"));
        records.push(RawRecord::live(vec![0, 5, 1, 1, 0], vec![2], 11, "b.ldb"));

        let catalog = MetadataCatalog::build(&records);
        let mut report = ExtractionReport::new();
        let classified = classify(
            &records,
            &catalog,
            &StoreFilter::only(["replychains"]),
            &mut report,
        );

        assert_eq!(classified.len(), 1);
        assert_eq!(classified[0].object_store_id, 2);
    }

    #[test]
    fn test_empty_value_is_kept_as_placeholder() {
        let mut records = catalog_records();
        records.push(RawRecord::deleted(vec![0, 5, 2, 1, 0], 10, "b.ldb"));

        let catalog = MetadataCatalog::build(&records);
        let mut report = ExtractionReport::new();
        let classified = classify(&records, &catalog, &StoreFilter::All, &mut report);

        assert_eq!(classified.len(), 1);
        assert!(classified[0].value().is_none());
        assert!(!classified[0].raw.is_live());
    }

    #[test]
    fn test_unnamed_store_excluded_from_filtered_run() {
        let mut records = catalog_records();
        // store 3 is inside the range but has no name
        records.push(RawRecord::live(vec![0, 5, 3, 1, 0], vec![7], 10, "b.ldb"));

        let catalog = MetadataCatalog::build(&records);

        let mut report = ExtractionReport::new();
        let filtered = classify(
            &records,
            &catalog,
            &StoreFilter::only(["people", "replychains"]),
            &mut report,
        );
        assert!(filtered.is_empty());
        assert!(report
            .events()
            .iter()
            .any(|e| e.code == EventCode::MetadataInconsistency));

        let mut report = ExtractionReport::new();
        let unfiltered = classify(&records, &catalog, &StoreFilter::All, &mut report);
        assert_eq!(unfiltered.len(), 1);
        assert_eq!(unfiltered[0].store_name, None);
    }
}
