//! Observability for extraction runs
//!
//! The decoding core never logs. Problems are collected as typed events in
//! an `ExtractionReport`, and the caller publishes them through `Logger`
//! as structured JSON lines.
//!
//! # Usage
//!
//! ```ignore
//! use idbxtract::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::CatalogBuilt, &[("databases", "2")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

use std::io::Write;

/// Log an event at its own severity.
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log an event with fields at its own severity.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

/// Log an event with fields to `writer`.
pub fn log_event_to<W: Write>(event: Event, fields: &[(&str, &str)], writer: &mut W) {
    Logger::log_to(event.severity(), event.as_str(), fields, writer);
}
