//! Epoch-millisecond and Chromium timestamps
//!
//! Output form is UTC with microseconds and no zone suffix, e.g.
//! `2021-05-01T00:00:00.000000`.

use chrono::DateTime;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Format epoch milliseconds; `None` when out of chrono's range.
pub fn format_millis(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Microseconds between 1601-01-01 and 1970-01-01.
const WINDOWS_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

/// Format a Chromium `base::Time` value (microseconds since 1601-01-01).
pub fn format_windows_micros(micros: i64) -> Option<String> {
    let unix = micros.checked_sub(WINDOWS_EPOCH_OFFSET_MICROS)?;
    let nanos = (unix.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(unix.div_euclid(1_000_000), nanos)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}
