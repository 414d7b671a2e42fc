//! idbxtract - Forensic extraction of messaging-client records from
//! Chromium IndexedDB stores backed by LevelDB
//!
//! Input is the full set of raw LevelDB entries (deleted ones included);
//! output is deduplicated contacts, messages and meetings plus a report of
//! everything that was skipped along the way.

pub mod idb;
pub mod leveldb;
pub mod observability;
pub mod pipeline;
pub mod reconcile;
pub mod v8;
pub mod webstorage;

pub use leveldb::{KeyState, RawRecord};
pub use pipeline::{extract, run, Extraction, ExtractionReport, PipelineConfig, PipelineError};
pub use reconcile::ReconciledRecords;
