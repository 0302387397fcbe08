//! logship-sink — exports parsed records to an InfluxDB-compatible store.
//!
//! A [`SinkWriter`] pulls [`logship_core::LogRecord`]s off the record queue,
//! turns each into a [`Point`], and POSTs batches of line protocol through
//! an [`InfluxClient`]. Writer workers share only the target configuration;
//! each owns its own client and batch.

pub mod client;
pub mod point;
pub mod writer;

pub use client::{InfluxClient, SinkError};
pub use point::{encode_batch, FieldValue, Point};
pub use writer::{write_with_retry, RetryPolicy, SinkWriter, WriterStats};
