//! Batch points and their line-protocol encoding.
//!
//! One [`Point`] is exported per [`LogRecord`]:
//!
//! | Kind      | Keys                                      |
//! |-----------|-------------------------------------------|
//! | tags      | `Method`, `Path`, `Scheme`, `Status`      |
//! | fields    | `BytesSent` (int), `RequestTime`, `UpstreamTime` (float) |
//! | timestamp | the record's parsed log timestamp         |
//!
//! Tags are the low-cardinality request identity and get indexed by the
//! store; fields are the measured values.

use chrono::{DateTime, FixedOffset};
use logship_core::{LogRecord, Precision};
use std::fmt::Write;

/// A numeric field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
}

/// One measurement ready to export.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    /// Sorted by key, as the store prefers.
    pub tags: Vec<(&'static str, String)>,
    /// Sorted by key.
    pub fields: Vec<(&'static str, FieldValue)>,
    pub timestamp: DateTime<FixedOffset>,
}

impl Point {
    pub fn from_record(measurement: &str, record: &LogRecord) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: vec![
                ("Method", record.method.clone()),
                ("Path", record.path.clone()),
                ("Scheme", record.scheme.clone()),
                ("Status", record.status.clone()),
            ],
            fields: vec![
                (
                    "BytesSent",
                    FieldValue::Integer(i64::try_from(record.bytes_sent).unwrap_or(i64::MAX)),
                ),
                ("RequestTime", FieldValue::Float(record.request_time)),
                ("UpstreamTime", FieldValue::Float(record.upstream_time)),
            ],
            timestamp: record.timestamp,
        }
    }

    /// Append this point as one line-protocol line (with trailing `\n`).
    pub fn write_line(&self, precision: Precision, out: &mut String) {
        escape_into(out, &self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            // The store rejects empty tag values; drop them instead.
            if value.is_empty() {
                continue;
            }
            out.push(',');
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            escape_into(out, value, &[',', '=', ' ']);
        }

        let mut sep = ' ';
        for (key, value) in &self.fields {
            out.push(sep);
            sep = ',';
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            match value {
                FieldValue::Float(v) => {
                    let _ = write!(out, "{v}");
                }
                FieldValue::Integer(v) => {
                    let _ = write!(out, "{v}i");
                }
            }
        }

        let _ = writeln!(out, " {}", timestamp_in(&self.timestamp, precision));
    }
}

/// Encode a batch as a newline-separated line-protocol body.
pub fn encode_batch(points: &[Point], precision: Precision) -> String {
    let mut body = String::with_capacity(points.len() * 128);
    for point in points {
        point.write_line(precision, &mut body);
    }
    body
}

/// Unix timestamp expressed in `precision` units.
pub fn timestamp_in(ts: &DateTime<FixedOffset>, precision: Precision) -> i64 {
    let secs = ts.timestamp();
    let nanos = i64::from(ts.timestamp_subsec_nanos());
    match precision {
        Precision::Nanoseconds => secs.saturating_mul(1_000_000_000).saturating_add(nanos),
        Precision::Microseconds => secs.saturating_mul(1_000_000).saturating_add(nanos / 1_000),
        Precision::Milliseconds => secs.saturating_mul(1_000).saturating_add(nanos / 1_000_000),
        Precision::Seconds => secs,
        Precision::Minutes => secs.div_euclid(60),
        Precision::Hours => secs.div_euclid(3_600),
    }
}

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}
