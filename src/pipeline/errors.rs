//! Pipeline error types
//!
//! Only run-level failures surface as errors:
//! - IDBX_CONFIG_INVALID (ERROR severity)
//! - IDBX_NO_DATABASES (FATAL severity)
//!
//! Per-record problems never become a `PipelineError`; they are collected
//! in the `ExtractionReport`.

use std::fmt;
use std::io;

/// Severity levels for pipeline errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The run was not started
    Error,
    /// The input holds nothing extractable
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorCode {
    /// Configuration could not be read or failed validation
    ConfigInvalid,
    /// The catalog resolved no database at all
    NoDatabases,
}

impl PipelineErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineErrorCode::ConfigInvalid => "IDBX_CONFIG_INVALID",
            PipelineErrorCode::NoDatabases => "IDBX_NO_DATABASES",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PipelineErrorCode::ConfigInvalid => Severity::Error,
            PipelineErrorCode::NoDatabases => Severity::Fatal,
        }
    }
}

impl fmt::Display for PipelineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug)]
pub struct PipelineError {
    code: PipelineErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl PipelineError {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self {
            code: PipelineErrorCode::ConfigInvalid,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Configuration file could not be read
    pub fn config_unreadable(path: impl fmt::Display, source: io::Error) -> Self {
        Self {
            code: PipelineErrorCode::ConfigInvalid,
            message: "failed to read config".to_string(),
            details: Some(format!("path: {}", path)),
            source: Some(source),
        }
    }

    /// No database with a resolvable id among `raw_records` records
    pub fn no_databases(raw_records: u64) -> Self {
        Self {
            code: PipelineErrorCode::NoDatabases,
            message: "no IndexedDB database could be resolved".to_string(),
            details: Some(format!("raw_records: {}", raw_records)),
            source: None,
        }
    }

    pub fn code(&self) -> PipelineErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
