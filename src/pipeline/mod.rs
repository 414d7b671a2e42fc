//! Extraction pipeline
//!
//! Stages run strictly in order over one snapshot of raw records:
//!
//! 1. catalog: resolve databases, object stores and store names
//! 2. classify: select data records of the wanted stores
//! 3. decode: unwrap the Blink envelope and read the V8 value
//! 4. reconcile: map values onto contacts, messages and meetings
//!
//! Local and session storage are separate LevelDBs with their own passes
//! (`extract_local_storage`, `extract_session_storage`).
//!
//! A record that fails any stage is reported and dropped; the run goes on.
//! Only a bad configuration or an input without any database fails the run.

mod config;
mod errors;
mod record;
mod report;
mod storage;

pub use config::{PipelineConfig, TEAMS_OBJECT_STORES};
pub use errors::{PipelineError, PipelineErrorCode, PipelineResult, Severity};
pub use record::{decode_records, DeserializedRecord};
pub use report::{EventCode, ExtractionMetrics, ExtractionReport, ReportEvent, Stage};
pub use storage::{
    extract_local_storage, extract_session_storage, LocalStorageExtraction,
    SessionStorageExtraction,
};

use crate::idb::{classify, MetadataCatalog};
use crate::leveldb::RawRecord;
use crate::observability::{self, Event, Logger};
use crate::reconcile::{reconcile, ReconciledRecords};

/// Output of one run.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: ReconciledRecords,
    pub report: ExtractionReport,
}

/// Run every stage over `records`.
///
/// Never logs; the caller decides what to do with the report.
pub fn extract(records: &[RawRecord], config: &PipelineConfig) -> PipelineResult<Extraction> {
    config.validate()?;

    let mut report = ExtractionReport::new();

    let catalog = MetadataCatalog::build_with_report(records, &mut report);
    report.metrics.databases = catalog.resolved_databases().count() as u64;
    if report.metrics.databases == 0 {
        return Err(PipelineError::no_databases(report.metrics.raw_records));
    }

    let classified = classify(records, &catalog, &config.store_filter(), &mut report);
    let decoded = decode_records(&classified, config.resolve_limits(), &mut report);

    let reconciliation = reconcile(&decoded);
    report.extend(reconciliation.issues);
    report.metrics.contacts = reconciliation.records.contacts.len() as u64;
    report.metrics.messages = reconciliation.records.messages.len() as u64;
    report.metrics.meetings = reconciliation.records.meetings.len() as u64;
    report.metrics.duplicates_dropped = reconciliation.duplicates_dropped;

    Ok(Extraction {
        records: reconciliation.records,
        report,
    })
}

/// `extract`, then publish the report (or the failure) on stderr.
pub fn run(records: &[RawRecord], config: &PipelineConfig) -> PipelineResult<ReconciledRecords> {
    match extract(records, config) {
        Ok(extraction) => {
            extraction.report.emit();
            Ok(extraction.records)
        }
        Err(err) => {
            let severity = if err.is_fatal() {
                observability::Severity::Fatal
            } else {
                observability::Severity::Error
            };
            Logger::log(
                severity,
                Event::ExtractionFailed.as_str(),
                &[("code", err.code().code()), ("message", err.message())],
            );
            Err(err)
        }
    }
}
