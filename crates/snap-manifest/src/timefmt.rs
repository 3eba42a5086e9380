//! The manifest timestamp format.
//!
//! Timestamps are serialized as UTC at second precision in a fixed
//! `YYYY/MM/DD@HH:MM:SS` layout, so manifests compare byte-for-byte across
//! platforms and locales.

use chrono::{DateTime, NaiveDateTime};

use crate::error::{Error, Result};

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d@%H:%M:%S";

/// Format UTC seconds for a `modified=` attribute.
pub fn format_timestamp(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0)
        .unwrap_or_default()
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Parse a `modified=` attribute back to UTC seconds.
pub fn parse_timestamp(value: &str) -> Result<i64> {
    let parsed = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        Error::Timestamp {
            value: value.to_string(),
        }
    })?;
    Ok(parsed.and_utc().timestamp())
}
