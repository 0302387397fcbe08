//! Batching writer worker.
//!
//! Each worker owns one [`InfluxClient`] and one batch. The batch is flushed
//! when it is full, when the flush interval passes with points waiting, and
//! once more when the record queue closes.

use crate::client::{InfluxClient, SinkError};
use crate::point::{encode_batch, Point};
use logship_core::config::SinkConfig;
use logship_core::{LogRecord, Precision, SinkDsn};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How failed writes are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): doubles each time, capped.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl From<&SinkConfig> for RetryPolicy {
    fn from(cfg: &SinkConfig) -> Self {
        Self {
            attempts: cfg.retry_attempts,
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
        }
    }
}

/// Totals returned when a worker exits cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub points_written: u64,
    pub batches_written: u64,
    /// Batches rejected as permanently invalid.
    pub batches_dropped: u64,
}

pub struct SinkWriter {
    id: usize,
    client: InfluxClient,
    measurement: String,
    precision: Precision,
    batch_size: usize,
    flush_interval: Duration,
    retry: RetryPolicy,
    batch: Vec<Point>,
    stats: WriterStats,
}

impl SinkWriter {
    pub fn new(id: usize, dsn: &SinkDsn, cfg: &SinkConfig) -> Self {
        let batch_size = cfg.batch_size.max(1);
        Self {
            id,
            client: InfluxClient::new(dsn, cfg.timeout()),
            measurement: cfg.measurement.clone(),
            precision: dsn.precision,
            batch_size,
            flush_interval: cfg.flush_interval(),
            retry: RetryPolicy::from(cfg),
            batch: Vec::with_capacity(batch_size),
            stats: WriterStats::default(),
        }
    }

    /// Drain `rx` until every sender is gone, exporting as we go.
    ///
    /// Returns `RetriesExhausted` when a batch could not be written after
    /// all retries; the caller decides whether that ends the pipeline.
    /// `cancel` only cuts retry backoff short, it never stops the drain.
    pub async fn run(
        mut self,
        rx: flume::Receiver<LogRecord>,
        cancel: CancellationToken,
    ) -> Result<WriterStats, SinkError> {
        debug!(writer = self.id, url = %redact(self.client.write_url()), "writer started");

        let mut ticker = interval(self.flush_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                received = rx.recv_async() => match received {
                    Ok(record) => {
                        self.batch.push(Point::from_record(&self.measurement, &record));
                        if self.batch.len() >= self.batch_size {
                            self.flush(&cancel).await?;
                            ticker.reset();
                        }
                    }
                    Err(flume::RecvError::Disconnected) => break,
                },
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush(&cancel).await?;
                    }
                }
            }
        }

        if !self.batch.is_empty() {
            self.flush(&cancel).await?;
        }
        info!(
            writer = self.id,
            points = self.stats.points_written,
            batches = self.stats.batches_written,
            dropped = self.stats.batches_dropped,
            "writer finished"
        );
        Ok(self.stats)
    }

    async fn flush(&mut self, cancel: &CancellationToken) -> Result<(), SinkError> {
        let points = self.batch.len();
        let body = encode_batch(&self.batch, self.precision);
        self.batch.clear();

        match write_with_retry(&self.client, body, &self.retry, cancel).await {
            Ok(()) => {
                self.stats.points_written += points as u64;
                self.stats.batches_written += 1;
                debug!(writer = self.id, points, "batch written");
                Ok(())
            }
            Err(e) if e.is_permanent() => {
                self.stats.batches_dropped += 1;
                error!(writer = self.id, points, error = %e, "batch rejected by store, dropping it");
                Ok(())
            }
            Err(e) => {
                error!(writer = self.id, points, error = %e, "batch could not be written");
                Err(e)
            }
        }
    }
}

/// Write `body`, retrying transient failures per `policy`.
///
/// Permanent failures are returned as-is on the first attempt. Transient
/// failures that outlast the policy (or a cancellation during backoff)
/// come back wrapped in [`SinkError::RetriesExhausted`].
pub async fn write_with_retry(
    client: &InfluxClient,
    body: String,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), SinkError> {
    let mut retry = 0;
    loop {
        let err = match client.write(body.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_permanent() => return Err(e),
            Err(e) => e,
        };

        if retry >= policy.attempts {
            return Err(SinkError::RetriesExhausted {
                attempts: retry + 1,
                last: Box::new(err),
            });
        }

        let delay = policy.delay(retry);
        warn!(attempt = retry + 1, ?delay, error = %err, "write failed, retrying");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(SinkError::RetriesExhausted {
                    attempts: retry + 1,
                    last: Box::new(err),
                });
            }
        }
        retry += 1;
    }
}

/// Strip the password from a write URL before it is logged.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let v = if k == "p" { "***".into() } else { v.into_owned() };
                    (k.into_owned(), v)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.into()
        }
        Err(_) => url.to_string(),
    }
}
