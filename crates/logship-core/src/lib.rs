//! logship-core — shared building blocks for the logship pipeline.
//!
//! # Architecture
//!
//! ```text
//! LineSource ──► raw-line queue ──► LineParser ×N ──► record queue ──► MetricSink ×M ──► time-series store
//!      │                                 │
//!      └──────────── PipelineEvent ──────┴──► PipelineMonitor ──► GET /monitor
//! ```
//!
//! This crate holds what every stage agrees on: the [`types`], the fixed
//! access-log [`parser`], the sink connection string ([`dsn`]), the layered
//! [`config`], and the [`events`] channel stages use to report to the
//! monitor. It performs no I/O of its own beyond reading the config file.

pub mod config;
pub mod dsn;
pub mod events;
pub mod parser;
pub mod types;

pub use dsn::{Precision, SinkDsn};
pub use events::{event_channel, EventReceiver, EventReporter};
pub use parser::{parse_line, ParseError};
pub use types::{LogRecord, PipelineEvent, PipelineSnapshot, RawLine};
