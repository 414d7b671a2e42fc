//! Local and session storage extraction
//!
//! Each store is its own LevelDB, so these passes take their own raw
//! record supply and do not touch the IndexedDB catalog. Every live version
//! of an item is kept; deleted records carry no value and are ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::leveldb::RawRecord;
use crate::webstorage::{
    decode_session_value, decode_storage_string, parse_map_id, LocalStorageEntry,
    LocalStorageKey, OriginMetadata, SessionStorageEntry, SessionStorageKey,
};

use super::report::{EventCode, ExtractionReport, Stage};

/// Output of one local storage pass.
#[derive(Debug, Clone, Default)]
pub struct LocalStorageExtraction {
    /// Ordered by origin, key, then sequence
    pub entries: Vec<LocalStorageEntry>,
    pub origins: Vec<OriginMetadata>,
    pub report: ExtractionReport,
}

/// Output of one session storage pass.
#[derive(Debug, Clone, Default)]
pub struct SessionStorageExtraction {
    /// Ordered by host, guid, key, then sequence; unattributed maps first
    pub entries: Vec<SessionStorageEntry>,
    pub report: ExtractionReport,
}

fn live_by_sequence(records: &[RawRecord]) -> Vec<&RawRecord> {
    let mut live: Vec<&RawRecord> = records.iter().filter(|r| r.is_live()).collect();
    live.sort_by_key(|r| r.sequence);
    live
}

/// Read the items and origin metadata of a Local Storage LevelDB.
///
/// Values that are not JSON are reported and left out.
pub fn extract_local_storage(records: &[RawRecord]) -> LocalStorageExtraction {
    let mut report = ExtractionReport::new();
    report.metrics.raw_records = records.len() as u64;

    let mut entries = Vec::new();
    let mut origins: BTreeMap<String, OriginMetadata> = BTreeMap::new();

    for record in live_by_sequence(records) {
        let key = match LocalStorageKey::parse(&record.key) {
            Ok(key) => key,
            Err(err) => {
                report.record_skip(
                    Stage::WebStorage,
                    EventCode::KeyParseError,
                    record,
                    err.to_string(),
                );
                continue;
            }
        };

        let applied = match key {
            LocalStorageKey::Version => Ok(()),
            LocalStorageKey::Meta { origin } => origins
                .entry(origin.clone())
                .or_insert_with(|| OriginMetadata::new(origin))
                .apply_meta(&record.value),
            LocalStorageKey::MetaAccess { origin } => origins
                .entry(origin.clone())
                .or_insert_with(|| OriginMetadata::new(origin))
                .apply_meta_access(&record.value),
            LocalStorageKey::Data { origin, key } => {
                match local_value(&record.value) {
                    Ok(value) => entries.push(LocalStorageEntry {
                        origin,
                        key,
                        value,
                        leveldb_sequence_number: record.sequence,
                        origin_file: record.origin_file.clone(),
                    }),
                    Err(detail) => report.record_skip(
                        Stage::WebStorage,
                        EventCode::StorageValueError,
                        record,
                        detail,
                    ),
                }
                Ok(())
            }
        };
        if let Err(err) = applied {
            report.record_skip(
                Stage::WebStorage,
                EventCode::StorageValueError,
                record,
                err.to_string(),
            );
        }
    }

    entries.sort_by(|a, b| {
        (&a.origin, &a.key, a.leveldb_sequence_number).cmp(&(
            &b.origin,
            &b.key,
            b.leveldb_sequence_number,
        ))
    });
    report.metrics.storage_entries = entries.len() as u64;
    report.metrics.storage_origins = origins.len() as u64;

    LocalStorageExtraction {
        entries,
        origins: origins.into_values().collect(),
        report,
    }
}

fn local_value(bytes: &[u8]) -> Result<Value, String> {
    let text = decode_storage_string(bytes).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| format!("value is not JSON: {}", e))
}

/// Read the items of a Session Storage LevelDB and attribute each map to
/// every session that referenced it.
pub fn extract_session_storage(records: &[RawRecord]) -> SessionStorageExtraction {
    let mut report = ExtractionReport::new();
    report.metrics.raw_records = records.len() as u64;

    let live = live_by_sequence(records);
    let mut parsed = Vec::with_capacity(live.len());
    for record in live {
        match SessionStorageKey::parse(&record.key) {
            Ok(key) => parsed.push((record, key)),
            Err(err) => report.record_skip(
                Stage::WebStorage,
                EventCode::KeyParseError,
                record,
                err.to_string(),
            ),
        }
    }

    // map id -> (guid, host), over every namespace version
    let mut sessions: BTreeMap<u64, BTreeSet<(String, String)>> = BTreeMap::new();
    for (record, key) in &parsed {
        if let SessionStorageKey::Namespace { guid, host } = key {
            match parse_map_id(&record.value) {
                Ok(map_id) => {
                    sessions
                        .entry(map_id)
                        .or_default()
                        .insert((guid.clone(), host.clone()));
                }
                Err(err) => report.record_skip(
                    Stage::WebStorage,
                    EventCode::StorageValueError,
                    record,
                    err.to_string(),
                ),
            }
        }
    }

    let mut entries = Vec::new();
    for (record, key) in &parsed {
        let (map_id, item) = match key {
            SessionStorageKey::MapEntry { map_id, key } => (*map_id, key),
            _ => continue,
        };
        let value = match decode_session_value(&record.value) {
            Ok(value) => value,
            Err(err) => {
                report.record_skip(
                    Stage::WebStorage,
                    EventCode::StorageValueError,
                    record,
                    err.to_string(),
                );
                continue;
            }
        };

        let entry = |session: Option<&(String, String)>| SessionStorageEntry {
            host: session.map(|(_, host)| host.clone()),
            guid: session.map(|(guid, _)| guid.clone()),
            key: item.clone(),
            value: value.clone(),
            leveldb_sequence_number: record.sequence,
            origin_file: record.origin_file.clone(),
        };
        match sessions.get(&map_id) {
            Some(owners) => entries.extend(owners.iter().map(|owner| entry(Some(owner)))),
            None => entries.push(entry(None)),
        }
    }

    entries.sort_by(|a, b| {
        (&a.host, &a.guid, &a.key, a.leveldb_sequence_number).cmp(&(
            &b.host,
            &b.guid,
            &b.key,
            b.leveldb_sequence_number,
        ))
    });
    report.metrics.storage_entries = entries.len() as u64;

    SessionStorageExtraction { entries, report }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn local_key(origin: &str, key: &str) -> Vec<u8> {
        let mut out = vec![b'_'];
        out.extend_from_slice(origin.as_bytes());
        out.extend_from_slice(&[0x00, 0x01]);
        out.extend_from_slice(key.as_bytes());
        out
    }

    fn latin1(s: &str) -> Vec<u8> {
        let mut out = vec![0x01];
        out.extend_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn test_local_entries_keep_every_version() {
        let records = vec![
            RawRecord::live(local_key("https://b.test", "k"), latin1("2"), 9, "000005.log"),
            RawRecord::live(local_key("https://a.test", "k"), latin1("{\"x\":1}"), 4, "000005.log"),
            RawRecord::live(local_key("https://b.test", "k"), latin1("1"), 3, "000004.ldb"),
            RawRecord::deleted(local_key("https://b.test", "k"), 10, "000005.log"),
        ];
        let out = extract_local_storage(&records);

        let seen: Vec<(&str, u64)> = out
            .entries
            .iter()
            .map(|e| (e.origin.as_str(), e.leveldb_sequence_number))
            .collect();
        assert_eq!(
            seen,
            vec![("https://a.test", 4), ("https://b.test", 3), ("https://b.test", 9)]
        );
        assert_eq!(out.entries[0].value, serde_json::json!({"x": 1}));
        assert_eq!(out.report.metrics.raw_records, 4);
        assert_eq!(out.report.metrics.storage_entries, 3);
        assert_eq!(out.report.skipped_count(), 0);
    }

    #[test]
    fn test_local_non_json_value_reported() {
        let records = vec![RawRecord::live(
            local_key("https://a.test", "theme"),
            latin1("dark"),
            2,
            "000003.log",
        )];
        let out = extract_local_storage(&records);

        assert!(out.entries.is_empty());
        let event = &out.report.events()[0];
        assert_eq!(event.code, EventCode::StorageValueError);
        assert_eq!(event.stage, Stage::WebStorage);
        assert_eq!(event.sequence, Some(2));
    }

    #[test]
    fn test_local_origin_metadata_latest_wins() {
        let records = vec![
            RawRecord::live(b"META:https://a.test".to_vec(), vec![0x10, 0x05], 8, "a.log"),
            RawRecord::live(b"META:https://a.test".to_vec(), vec![0x10, 0x02], 3, "a.log"),
            RawRecord::live(b"VERSION".to_vec(), b"1".to_vec(), 1, "a.log"),
            RawRecord::live(b"bogus".to_vec(), vec![], 2, "a.log"),
        ];
        let out = extract_local_storage(&records);

        assert_eq!(out.origins.len(), 1);
        assert_eq!(out.origins[0].size_bytes, Some(5));
        assert_eq!(out.report.metrics.storage_origins, 1);
        assert_eq!(out.report.events()[0].code, EventCode::KeyParseError);
    }

    const GUID_A: &str = "aaaaaaaa_aaaa_aaaa_aaaa_aaaaaaaaaaaa";
    const GUID_B: &str = "bbbbbbbb_bbbb_bbbb_bbbb_bbbbbbbbbbbb";

    fn namespace(guid: &str, host: &str, map_id: &str, seq: u64) -> RawRecord {
        let key = format!("namespace-{}-{}", guid, host);
        RawRecord::live(key.into_bytes(), map_id.as_bytes().to_vec(), seq, "000003.log")
    }

    fn map_entry(map_id: u64, key: &str, value: &str, seq: u64) -> RawRecord {
        let key = format!("map-{}-{}", map_id, key);
        RawRecord::live(key.into_bytes(), utf16(value), seq, "000003.log")
    }

    #[test]
    fn test_session_entries_joined_to_namespaces() {
        let records = vec![
            namespace(GUID_A, "https://teams.microsoft.com/", "1", 1),
            namespace(GUID_B, "https://teams.microsoft.com/", "1", 2),
            map_entry(1, "draft", "hello", 5),
            map_entry(7, "lost", "x", 6),
            RawRecord::live(b"next-map-id".to_vec(), b"8".to_vec(), 7, "000003.log"),
        ];
        let out = extract_session_storage(&records);

        assert_eq!(out.entries.len(), 3);
        // unattributed map sorts first
        assert_eq!(out.entries[0].host, None);
        assert_eq!(out.entries[0].key, "lost");
        assert_eq!(out.entries[1].guid.as_deref(), Some(GUID_A));
        assert_eq!(out.entries[2].guid.as_deref(), Some(GUID_B));
        assert_eq!(out.entries[2].value, "hello");
        assert_eq!(out.report.metrics.storage_entries, 3);
        assert_eq!(out.report.skipped_count(), 0);
    }

    #[test]
    fn test_session_bad_records_reported() {
        let records = vec![
            namespace(GUID_A, "https://a.test/", "one", 1),
            RawRecord::live(b"map-2-k".to_vec(), vec![b'h'], 2, "000003.log"),
            RawRecord::live(b"namespace-short".to_vec(), b"1".to_vec(), 3, "000003.log"),
        ];
        let out = extract_session_storage(&records);

        assert!(out.entries.is_empty());
        let codes: Vec<EventCode> = out.report.events().iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                EventCode::KeyParseError,
                EventCode::StorageValueError,
                EventCode::StorageValueError
            ]
        );
    }
}
