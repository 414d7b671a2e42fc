//! Metadata catalog invariant tests
//!
//! Tests for:
//! - Latest write wins for every metadata key, regardless of input order
//! - A newer deletion hides a key; an older one is superseded
//! - Store ranges and names per database
//! - Classification keeps deleted data records for forensic review

mod common;

use common::*;
use idbxtract::idb::{classify, DatabaseMetaType, MetadataCatalog, StoreFilter};
use idbxtract::pipeline::ExtractionReport;
use idbxtract::RawRecord;

// =============================================================================
// Test Utilities
// =============================================================================

fn name_entry(store_id: u64, name: &str, sequence: u64) -> RawRecord {
    RawRecord::live(
        store_name_key(1, store_id),
        idbxtract::idb::encode_utf16_be(name),
        sequence,
        "000003.log",
    )
}

fn store_names(catalog: &MetadataCatalog) -> Vec<Option<String>> {
    catalog.object_stores(1).into_iter().map(|s| s.name).collect()
}

// =============================================================================
// Latest Write Wins
// =============================================================================

#[test]
fn test_rename_resolved_by_sequence_not_position() {
    let mut fixture = Fixture::new();
    fixture.database("Teams:main", 1, &["people"]);
    let mut records = fixture.build();
    records.push(name_entry(1, "renamed", 100));
    records.push(name_entry(1, "stale", 50));

    let forward = MetadataCatalog::build(&records);
    records.reverse();
    let backward = MetadataCatalog::build(&records);

    assert_eq!(store_names(&forward), vec![Some("renamed".to_string())]);
    assert_eq!(store_names(&forward), store_names(&backward));
}

#[test]
fn test_newer_deletion_hides_store_name() {
    let mut fixture = Fixture::new();
    fixture
        .database("Teams:main", 1, &["people", "replychains"])
        .deleted(store_name_key(1, 2), "000006.log");

    let catalog = MetadataCatalog::build(&fixture.build());
    assert_eq!(
        store_names(&catalog),
        vec![Some("people".to_string()), None]
    );
}

#[test]
fn test_older_deletion_is_superseded() {
    let mut records = vec![RawRecord::deleted(store_name_key(1, 1), 1, "000001.log")];
    let mut fixture = Fixture::new();
    fixture.database("Teams:main", 1, &["people"]);
    records.extend(fixture.build().into_iter().map(|mut r| {
        r.sequence += 10;
        r
    }));

    let catalog = MetadataCatalog::build(&records);
    assert_eq!(store_names(&catalog), vec![Some("people".to_string())]);
}

#[test]
fn test_maximum_store_id_latest_wins() {
    let mut fixture = Fixture::new();
    fixture.database("Teams:main", 1, &["people"]);
    fixture.live(max_store_id_key(1), vec![3], "000007.ldb");

    let catalog = MetadataCatalog::build(&fixture.build());
    let entry = catalog
        .database_metadata()
        .get(1, DatabaseMetaType::MaximumObjectStoreId)
        .unwrap();
    assert_eq!(entry.value, vec![3]);
    assert_eq!(entry.origin_file, "000007.ldb");
    assert_eq!(catalog.object_stores(1).len(), 3);
}

// =============================================================================
// Databases
// =============================================================================

#[test]
fn test_multiple_databases_sorted_by_id() {
    let mut fixture = Fixture::new();
    fixture
        .database("Teams:replychain-manager", 7, &["replychains"])
        .database("Teams:profiles", 2, &["people"]);

    let catalog = MetadataCatalog::build(&fixture.build());
    let ids: Vec<u64> = catalog.resolved_databases().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![2, 7]);
    assert_eq!(catalog.global().database_name(7), Some("Teams:replychain-manager"));
    assert_eq!(catalog.global().databases()[0].origin, ORIGIN);
}

#[test]
fn test_truncated_store_id_varint_reported() {
    let mut fixture = Fixture::new();
    fixture
        .database("Teams:main", 1, &["people"])
        .live(vec![0x00, 0x01, 0x00, 0x00, 0x32, 0x80], vec![0x00], "000003.log");

    let mut report = ExtractionReport::new();
    let catalog = MetadataCatalog::build_with_report(&fixture.build(), &mut report);

    assert_eq!(store_names(&catalog), vec![Some("people".to_string())]);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.events()[0].origin_file.as_deref(), Some("000003.log"));
}

// =============================================================================
// Classification
// =============================================================================

#[test]
fn test_classification_keeps_every_version() {
    let mut fixture = Fixture::new();
    fixture
        .database("Teams:main", 1, &["people", "settings"])
        .live(data_key(1, 1, "a"), person("8:a", "v1"), "000003.log")
        .live(data_key(1, 1, "a"), person("8:a", "v2"), "000004.log")
        .deleted(data_key(1, 1, "a"), "000005.log")
        .live(data_key(1, 2, "theme"), vec![0x01], "000003.log");
    let records = fixture.build();

    let mut report = ExtractionReport::new();
    let catalog = MetadataCatalog::build_with_report(&records, &mut report);
    let classified = classify(
        &records,
        &catalog,
        &StoreFilter::only(["people"]),
        &mut report,
    );

    assert_eq!(classified.len(), 3);
    assert!(classified.iter().all(|r| r.store_name.as_deref() == Some("people")));
    assert_eq!(classified[0].user_key.to_string(), "a");
    assert!(classified[2].value().is_none());
    assert_eq!(report.metrics.data_records.get("people"), Some(&3));
}

#[test]
fn test_unfiltered_classification_groups_by_store() {
    let mut fixture = Fixture::new();
    fixture
        .database("Teams:main", 1, &["people", "settings"])
        .live(data_key(1, 2, "theme"), vec![0x01], "000003.log")
        .live(data_key(1, 1, "a"), person("8:a", "A"), "000003.log");
    let records = fixture.build();

    let catalog = MetadataCatalog::build(&records);
    let mut report = ExtractionReport::new();
    let classified = classify(&records, &catalog, &StoreFilter::All, &mut report);

    let stores: Vec<u64> = classified.iter().map(|r| r.object_store_id).collect();
    assert_eq!(stores, vec![1, 2]);
}
