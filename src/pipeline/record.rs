//! Value decoding of classified records

use serde_json::Value;

use crate::idb::{ClassifiedRecord, UserKey};
use crate::v8::{decode_json, ResolveLimits, ValueError};

use super::report::{EventCode, ExtractionReport, Stage};

/// A data record with its value decoded to a plain tree.
///
/// `value` is `None` for placeholder records whose stored value is empty.
/// Back-references are already resolved, so the tree holds no aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct DeserializedRecord {
    pub store_name: Option<String>,
    pub database_id: u64,
    pub object_store_id: u64,
    pub user_key: UserKey,
    pub value: Option<Value>,
    pub origin_file: String,
    pub sequence: u64,
    pub live: bool,
}

impl DeserializedRecord {
    fn from_classified(record: &ClassifiedRecord<'_>, value: Option<Value>) -> Self {
        Self {
            store_name: record.store_name.clone(),
            database_id: record.database_id,
            object_store_id: record.object_store_id,
            user_key: record.user_key.clone(),
            value,
            origin_file: record.raw.origin_file.clone(),
            sequence: record.raw.sequence,
            live: record.raw.is_live(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.is_none()
    }
}

/// Decode every classified record. Undecodable values are reported and skipped.
pub fn decode_records(
    records: &[ClassifiedRecord<'_>],
    limits: ResolveLimits,
    report: &mut ExtractionReport,
) -> Vec<DeserializedRecord> {
    let mut decoded = Vec::with_capacity(records.len());

    for record in records {
        let bytes = match record.value() {
            Some(bytes) => bytes,
            None => {
                report.metrics.empty_values += 1;
                decoded.push(DeserializedRecord::from_classified(record, None));
                continue;
            }
        };

        match decode_json(bytes, limits) {
            Ok(value) => {
                report.metrics.values_decoded += 1;
                decoded.push(DeserializedRecord::from_classified(record, Some(value)));
            }
            Err(err) => {
                let code = match err {
                    ValueError::Envelope(_) => EventCode::EnvelopeError,
                    ValueError::Decode(_) | ValueError::Resolve(_) => EventCode::V8DecodeError,
                };
                report.record_skip(Stage::Decode, code, record.raw, err.to_string());
            }
        }
    }

    decoded
}
