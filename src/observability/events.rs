//! Observable extraction events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Metadata catalog reconstructed
    CatalogBuilt,
    /// Data records of one object store selected
    StoreClassified,
    /// A record was skipped
    RecordSkipped,
    /// A store-level metadata problem
    MetadataInconsistency,
    /// Reaction classification without a recognised activity type
    AmbiguousReaction,
    /// Values decoded
    DecodeComplete,
    /// Entities reconciled
    ReconcileComplete,
    /// Local or session storage entries assembled
    WebStorageRead,
    /// End of run
    ExtractionComplete,
    /// Hard failure, no output
    ExtractionFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::CatalogBuilt => "CATALOG_BUILT",
            Event::StoreClassified => "STORE_CLASSIFIED",
            Event::RecordSkipped => "RECORD_SKIPPED",
            Event::MetadataInconsistency => "METADATA_INCONSISTENCY",
            Event::AmbiguousReaction => "AMBIGUOUS_REACTION",
            Event::DecodeComplete => "DECODE_COMPLETE",
            Event::ReconcileComplete => "RECONCILE_COMPLETE",
            Event::WebStorageRead => "WEB_STORAGE_READ",
            Event::ExtractionComplete => "EXTRACTION_COMPLETE",
            Event::ExtractionFailed => "EXTRACTION_FAILED",
        }
    }

    /// Severity this event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::RecordSkipped | Event::MetadataInconsistency | Event::AmbiguousReaction => {
                Severity::Warn
            }
            Event::ExtractionFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
