//! logship — tail an access log and ship every line to a time-series store.
//!
//! The root crate holds the parts that tie the member crates together:
//! the [`parse_worker`] loop, the [`monitor`] service with its status
//! endpoint, and the [`pipeline`] that wires them up. The `logship` binary is
//! a thin CLI over [`pipeline::Pipeline`].

pub mod monitor;
pub mod parse_worker;
pub mod pipeline;

pub use monitor::{MonitorHandle, MonitorService};
pub use pipeline::{Pipeline, PipelineReport};
