//! Core types for logship-core.
//!
//! This module defines the data structures shared across every pipeline
//! stage: the [`RawLine`] handed from the source to the parsers, the parsed
//! [`LogRecord`] handed to the sink writers, the [`PipelineEvent`] vocabulary
//! reported to the monitor, and the [`PipelineSnapshot`] served by the
//! status endpoint.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// One log line as read from the tailed file, trailing newline stripped.
///
/// Consumed exactly once by whichever parser worker pops it from the queue.
pub type RawLine = Vec<u8>;

/// A fully parsed access-log line.
///
/// Only ever built from a line that matched the whole grammar and whose
/// timestamp and request field were valid. Partially parsed lines are dropped
/// by the parser and never reach the record queue.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Bracketed log timestamp, keeping the offset written in the line.
    pub timestamp: DateTime<FixedOffset>,
    /// Bytes sent for the request. `0` when the field was not a number.
    pub bytes_sent: u64,
    /// Path component of the request target; query and fragment discarded.
    pub path: String,
    /// HTTP verb token (`GET`, `POST`, …).
    pub method: String,
    /// Scheme token reported by the server (`http`, `https`).
    pub scheme: String,
    /// Three-digit status code, kept as text.
    pub status: String,
    /// Upstream response time in seconds, `0.0` when absent or invalid.
    pub upstream_time: f64,
    /// Total request time in seconds, `0.0` when absent or invalid.
    pub request_time: f64,
}

/// Something a pipeline stage wants the monitor to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    /// The source read one line from the file.
    LineHandled,
    /// A parser dropped one line.
    ParseError,
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::LineHandled => write!(f, "line_handled"),
            PipelineEvent::ParseError => write!(f, "parse_error"),
        }
    }
}

/// Point-in-time view of the pipeline served by the status endpoint.
///
/// Built fresh for every request from a copy of the monitor's counters plus
/// live queue depths. Field names follow the status document's JSON keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    /// Total lines read from the input file.
    #[serde(rename = "handleLine")]
    pub handle_line: u64,
    /// Lines per second over the last sampling interval.
    pub tps: f64,
    /// Current depth of the raw-line queue.
    #[serde(rename = "readChanLen")]
    pub read_chan_len: usize,
    /// Current depth of the record queue.
    #[serde(rename = "writeChanLen")]
    pub write_chan_len: usize,
    /// Time since the monitor started, human readable.
    #[serde(rename = "runTime")]
    pub run_time: String,
    /// Total lines dropped by the parsers.
    #[serde(rename = "errNum")]
    pub err_num: u64,
}
