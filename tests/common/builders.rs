//! Test builders: records, tailed log files, and pipeline configs.
//!
//! Designed for readability in tests, not for production use. They panic on
//! invalid input rather than returning `Result`.

use chrono::{DateTime, FixedOffset};
use logship_core::config::Config;
use logship_core::LogRecord;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// LogRecordBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`LogRecord`] fixtures.
///
/// ```rust
/// let record = LogRecordBuilder::new("/api/v1/orders")
///     .method("POST")
///     .status("201")
///     .build();
/// ```
pub struct LogRecordBuilder {
    record: LogRecord,
}

impl LogRecordBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            record: LogRecord {
                timestamp: ts("2018-03-04T13:49:52+00:00"),
                bytes_sent: 2133,
                path: path.into(),
                method: "GET".to_string(),
                scheme: "http".to_string(),
                status: "200".to_string(),
                upstream_time: 1.005,
                request_time: 1.854,
            },
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.record.method = method.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.record.status = status.to_string();
        self
    }

    pub fn timestamp(mut self, rfc3339: &str) -> Self {
        self.record.timestamp = ts(rfc3339);
        self
    }

    pub fn bytes(mut self, bytes: u64) -> Self {
        self.record.bytes_sent = bytes;
        self
    }

    pub fn build(self) -> LogRecord {
        self.record
    }
}

pub fn ts(rfc3339: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(rfc3339).expect("fixture timestamp must be RFC 3339")
}

// ---------------------------------------------------------------------------
// TailedLog
// ---------------------------------------------------------------------------

/// An access log in a private temp directory that tests append to.
pub struct TailedLog {
    _dir: TempDir,
    path: PathBuf,
}

impl TailedLog {
    /// Create an empty log file.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("access.log");
        std::fs::File::create(&path).expect("create access.log");
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append lines, each terminated with `\n`, and flush.
    pub fn append<S: AsRef<str>>(&self, lines: &[S]) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .expect("open access.log for append");
        for line in lines {
            writeln!(file, "{}", line.as_ref()).expect("append line");
        }
        file.flush().expect("flush access.log");
    }

    /// Move the current file aside and create a fresh one at the same path.
    pub fn rotate(&self) {
        let rotated = self.path.with_extension("log.1");
        std::fs::rename(&self.path, rotated).expect("rename access.log");
        std::fs::File::create(&self.path).expect("recreate access.log");
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Defaults pointed at `log` and `sink_base`, with the status endpoint on an
/// ephemeral loopback port and short intervals.
pub fn test_config(log: &Path, sink_base: &str) -> Config {
    let mut cfg = Config::defaults();
    cfg.input.path = log.to_path_buf();
    cfg.input.poll_interval_us = 1_000;
    cfg.sink.dsn = format!("{sink_base}@tester@secret@nginx@s");
    cfg.sink.flush_interval_ms = 50;
    cfg.sink.timeout_ms = 2_000;
    cfg.sink.retry_base_delay_ms = 10;
    cfg.sink.retry_max_delay_ms = 50;
    cfg.monitor.listen = "127.0.0.1:0".parse().expect("loopback addr");
    cfg.monitor.sample_interval_secs = 1;
    cfg
}
