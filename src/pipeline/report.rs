//! Extraction report: skip events and run metrics
//!
//! Every per-record problem becomes a `ReportEvent` instead of aborting the
//! run. The report is owned by one `extract` call and published at the end
//! through the structured logger.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::leveldb::RawRecord;
use crate::observability::{log_event_to, Event};

/// Pipeline stage that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Catalog,
    Classify,
    Decode,
    Reconcile,
    WebStorage,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Catalog => "catalog",
            Stage::Classify => "classify",
            Stage::Decode => "decode",
            Stage::Reconcile => "reconcile",
            Stage::WebStorage => "web_storage",
        }
    }
}

/// What happened to a record or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventCode {
    /// Key matches no known shape
    KeyParseError,
    /// Truncated or overflowing varint
    VarintError,
    /// Missing or unsupported value envelope
    EnvelopeError,
    /// Malformed V8 stream
    V8DecodeError,
    /// Entity without the fields that identify it
    ReconciliationError,
    /// Object store without a resolvable name
    MetadataInconsistency,
    /// Reaction with an unrecognised activity type
    AmbiguousReaction,
    /// Local storage value that is not JSON
    StorageValueError,
}

impl EventCode {
    pub fn code(&self) -> &'static str {
        match self {
            EventCode::KeyParseError => "IDBX_KEY_PARSE_ERROR",
            EventCode::VarintError => "IDBX_VARINT_ERROR",
            EventCode::EnvelopeError => "IDBX_ENVELOPE_ERROR",
            EventCode::V8DecodeError => "IDBX_V8_DECODE_ERROR",
            EventCode::ReconciliationError => "IDBX_RECONCILIATION_ERROR",
            EventCode::MetadataInconsistency => "IDBX_METADATA_INCONSISTENCY",
            EventCode::AmbiguousReaction => "IDBX_AMBIGUOUS_REACTION",
            EventCode::StorageValueError => "IDBX_STORAGE_VALUE_ERROR",
        }
    }

    /// Whether the item was dropped, as opposed to kept and flagged.
    pub fn is_skip(&self) -> bool {
        !matches!(
            self,
            EventCode::MetadataInconsistency | EventCode::AmbiguousReaction
        )
    }

    fn event(&self) -> Event {
        match self {
            EventCode::MetadataInconsistency => Event::MetadataInconsistency,
            EventCode::AmbiguousReaction => Event::AmbiguousReaction,
            _ => Event::RecordSkipped,
        }
    }
}

/// One skipped or flagged item, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEvent {
    pub stage: Stage,
    pub code: EventCode,
    pub origin_file: Option<String>,
    pub sequence: Option<u64>,
    pub key_hex: Option<String>,
    pub database_id: Option<u64>,
    pub object_store_id: Option<u64>,
    pub detail: String,
}

impl ReportEvent {
    pub fn new(stage: Stage, code: EventCode, detail: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            origin_file: None,
            sequence: None,
            key_hex: None,
            database_id: None,
            object_store_id: None,
            detail: detail.into(),
        }
    }

    pub fn with_origin(mut self, origin_file: impl Into<String>) -> Self {
        self.origin_file = Some(origin_file.into());
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Attach the raw record's origin, sequence and key.
    pub fn for_record(self, record: &RawRecord) -> Self {
        let mut event = self
            .with_origin(record.origin_file.clone())
            .with_sequence(record.sequence);
        event.key_hex = Some(record.key_hex());
        event
    }

    pub fn for_store(mut self, database_id: u64, object_store_id: u64) -> Self {
        self.database_id = Some(database_id);
        self.object_store_id = Some(object_store_id);
        self
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("stage", self.stage.as_str().to_string()),
            ("code", self.code.code().to_string()),
            ("detail", self.detail.clone()),
        ];
        if let Some(origin) = &self.origin_file {
            fields.push(("origin_file", origin.clone()));
        }
        if let Some(seq) = self.sequence {
            fields.push(("sequence", seq.to_string()));
        }
        if let Some(key) = &self.key_hex {
            fields.push(("key", key.clone()));
        }
        if let Some(db) = self.database_id {
            fields.push(("database_id", db.to_string()));
        }
        if let Some(store) = self.object_store_id {
            fields.push(("object_store_id", store.to_string()));
        }
        fields
    }
}

/// Counters for one run. All values are exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionMetrics {
    /// Raw records seen by the catalog pass
    pub raw_records: u64,
    /// Global, database and object-store metadata records
    pub metadata_records: u64,
    /// Keys of no recognised shape
    pub unclassified_keys: u64,
    /// Databases with a resolved id
    pub databases: u64,
    /// Classified data records per store name; unnamed stores under `""`
    pub data_records: BTreeMap<String, u64>,
    pub values_decoded: u64,
    /// Data records with an empty value, kept as placeholders
    pub empty_values: u64,
    pub contacts: u64,
    pub messages: u64,
    pub meetings: u64,
    /// Entities dropped because an earlier one had the same identity
    pub duplicates_dropped: u64,
    /// Local or session storage entries kept
    pub storage_entries: u64,
    /// Origins with `META:` or `METAACCESS:` records
    pub storage_origins: u64,
}

impl ExtractionMetrics {
    pub fn count_data_record(&mut self, store_name: Option<&str>) {
        *self
            .data_records
            .entry(store_name.unwrap_or_default().to_string())
            .or_insert(0) += 1;
    }

    pub fn total_data_records(&self) -> u64 {
        self.data_records.values().sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    events: Vec<ReportEvent>,
    pub metrics: ExtractionMetrics,
}

impl ExtractionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ReportEvent) {
        self.events.push(event);
    }

    /// Record a problem with one raw record.
    pub fn record_skip(
        &mut self,
        stage: Stage,
        code: EventCode,
        record: &RawRecord,
        detail: impl Into<String>,
    ) {
        self.push(ReportEvent::new(stage, code, detail).for_record(record));
    }

    /// Record a problem with an object store as a whole.
    pub fn record_store_issue(
        &mut self,
        code: EventCode,
        database_id: u64,
        object_store_id: u64,
        detail: impl Into<String>,
    ) {
        self.push(
            ReportEvent::new(Stage::Classify, code, detail).for_store(database_id, object_store_id),
        );
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = ReportEvent>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[ReportEvent] {
        &self.events
    }

    /// Number of dropped records and entities.
    pub fn skipped_count(&self) -> usize {
        self.events.iter().filter(|e| e.code.is_skip()).count()
    }

    /// Events for items that were kept but flagged.
    pub fn flagged(&self) -> impl Iterator<Item = &ReportEvent> {
        self.events.iter().filter(|e| !e.code.is_skip())
    }

    /// Write one line per event, then one summary line per stage.
    pub fn emit_to<W: Write>(&self, writer: &mut W) {
        for event in &self.events {
            let fields = event.fields();
            let borrowed: Vec<(&str, &str)> =
                fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            log_event_to(event.code.event(), &borrowed, writer);
        }

        let m = &self.metrics;
        emit_counts(
            Event::CatalogBuilt,
            &[
                ("raw_records", m.raw_records),
                ("metadata_records", m.metadata_records),
                ("unclassified_keys", m.unclassified_keys),
                ("databases", m.databases),
            ],
            writer,
        );

        for (store, count) in &m.data_records {
            let count = count.to_string();
            log_event_to(
                Event::StoreClassified,
                &[("store", store.as_str()), ("records", count.as_str())],
                writer,
            );
        }

        emit_counts(
            Event::DecodeComplete,
            &[
                ("values_decoded", m.values_decoded),
                ("empty_values", m.empty_values),
            ],
            writer,
        );
        emit_counts(
            Event::ReconcileComplete,
            &[
                ("contacts", m.contacts),
                ("messages", m.messages),
                ("meetings", m.meetings),
                ("duplicates_dropped", m.duplicates_dropped),
            ],
            writer,
        );
        if m.storage_entries > 0 || m.storage_origins > 0 {
            emit_counts(
                Event::WebStorageRead,
                &[
                    ("entries", m.storage_entries),
                    ("origins", m.storage_origins),
                ],
                writer,
            );
        }
        emit_counts(
            Event::ExtractionComplete,
            &[
                ("skipped", self.skipped_count() as u64),
                ("flagged", self.flagged().count() as u64),
            ],
            writer,
        );
    }

    /// Publish to stderr.
    pub fn emit(&self) {
        self.emit_to(&mut io::stderr());
    }
}

fn emit_counts<W: Write>(event: Event, counts: &[(&str, u64)], writer: &mut W) {
    let rendered: Vec<(&str, String)> = counts.iter().map(|(k, v)| (*k, v.to_string())).collect();
    let fields: Vec<(&str, &str)> = rendered.iter().map(|(k, v)| (*k, v.as_str())).collect();
    log_event_to(event, &fields, writer);
}
