//! Wiring: source, parser pool, writer pool, monitor, status endpoint.
//!
//! ```text
//! FileTail ─► raw queue ─► run_parser ×N ─► record queue ─► SinkWriter ×M
//! ```
//!
//! Everything runs under one cancellation token. Cancelling it (Ctrl-C, or
//! a fatal error from the source or a writer) stops the source; the pools
//! then drain what is already queued and exit on their own as each queue
//! closes.

use crate::monitor::{self, MonitorHandle, MonitorService};
use crate::parse_worker::{run_parser, ParserStats};
use anyhow::{anyhow, Context};
use logship_core::config::Config;
use logship_core::{event_channel, EventReporter, LogRecord, RawLine};
use logship_feeds::{FileTail, TailOptions};
use logship_sink::{SinkWriter, WriterStats};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Totals across every worker once the pipeline has stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub parser: ParserStats,
    pub writer: WriterStats,
}

/// A pipeline whose input is open and whose status port is bound, but which
/// has not started any task yet.
pub struct Pipeline {
    config: Config,
    source: FileTail,
    listener: TcpListener,
    status_addr: SocketAddr,
    raw: (flume::Sender<RawLine>, flume::Receiver<RawLine>),
    records: (flume::Sender<LogRecord>, flume::Receiver<LogRecord>),
    reporter: EventReporter,
    monitor: MonitorService,
    handle: MonitorHandle,
}

impl Pipeline {
    /// Open the input and bind the status listener. Both failures are fatal.
    pub async fn prepare(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let source = FileTail::open(&config.input.path, TailOptions::from(&config.input))
            .await
            .context("opening input")?;

        let listener = TcpListener::bind(config.monitor.listen)
            .await
            .with_context(|| format!("binding status endpoint on {}", config.monitor.listen))?;
        let status_addr = listener.local_addr()?;

        let raw = flume::bounded(config.pipeline.raw_queue_capacity);
        let records = flume::bounded(config.pipeline.record_queue_capacity);

        let (reporter, events) = event_channel();
        let (monitor, handle) = MonitorService::new(
            events,
            raw.0.downgrade(),
            records.0.downgrade(),
            config.monitor.sample_interval(),
        );
        let monitor = monitor.with_startup_delay(config.monitor.startup_delay());

        Ok(Self {
            config,
            source,
            listener,
            status_addr,
            raw,
            records,
            reporter,
            monitor,
            handle,
        })
    }

    /// Where the status endpoint listens (useful when bound to port 0).
    pub fn status_addr(&self) -> SocketAddr {
        self.status_addr
    }

    pub fn monitor(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Run until `cancel` fires or a stage fails fatally.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<PipelineReport> {
        let Self {
            config,
            source,
            listener,
            status_addr: _,
            raw: (raw_tx, raw_rx),
            records: (record_tx, record_rx),
            reporter,
            monitor,
            handle,
        } = self;

        let dsn = config.sink.parsed_dsn().context("sink.dsn")?;
        info!(
            input = %config.input.path.display(),
            sink = %dsn,
            parsers = config.pipeline.parser_workers,
            writers = config.pipeline.writer_workers,
            "starting pipeline"
        );

        // Fatal errors cancel this child only; the caller's token is left alone.
        let shutdown = cancel.child_token();

        let monitor_task = tokio::spawn(monitor.run(shutdown.clone()));
        let app = monitor::router(handle, &config.monitor.path);
        let server_task = tokio::spawn(monitor::serve(listener, app, shutdown.clone()));

        let mut source_task = tokio::spawn(source.run(raw_tx, reporter.clone(), shutdown.clone()));

        let mut parsers = JoinSet::new();
        for id in 0..config.pipeline.parser_workers {
            parsers.spawn(run_parser(
                id,
                raw_rx.clone(),
                record_tx.clone(),
                reporter.clone(),
            ));
        }
        drop((raw_rx, record_tx, reporter));

        let mut writers = JoinSet::new();
        for id in 0..config.pipeline.writer_workers {
            let writer = SinkWriter::new(id, &dsn, &config.sink);
            writers.spawn(writer.run(record_rx.clone(), shutdown.clone()));
        }
        drop(record_rx);

        let mut report = PipelineReport::default();
        let mut fatal: Option<anyhow::Error> = None;
        let mut source_done = false;
        let mut stopping = false;

        while !(source_done && writers.is_empty()) {
            tokio::select! {
                _ = shutdown.cancelled(), if !stopping => {
                    stopping = true;
                    info!("shutdown requested, draining queues");
                }
                joined = &mut source_task, if !source_done => {
                    source_done = true;
                    let failure = match joined {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(anyhow::Error::new(e).context("input source")),
                        Err(e) => Some(anyhow!("input source task failed: {e}")),
                    };
                    if let Some(e) = failure {
                        error!(error = %format!("{e:#}"), "input source failed");
                        fatal.get_or_insert(e);
                        shutdown.cancel();
                    }
                }
                Some(joined) = writers.join_next() => {
                    let failure = match joined {
                        Ok(Ok(stats)) => {
                            report.writer.points_written += stats.points_written;
                            report.writer.batches_written += stats.batches_written;
                            report.writer.batches_dropped += stats.batches_dropped;
                            None
                        }
                        Ok(Err(e)) => Some(anyhow::Error::new(e).context("sink writer")),
                        Err(e) => Some(anyhow!("sink writer task failed: {e}")),
                    };
                    if let Some(e) = failure {
                        error!(error = %format!("{e:#}"), "sink writer failed");
                        fatal.get_or_insert(e);
                        shutdown.cancel();
                    }
                }
            }
        }

        while let Some(joined) = parsers.join_next().await {
            match joined {
                Ok(stats) => {
                    report.parser.parsed += stats.parsed;
                    report.parser.dropped += stats.dropped;
                }
                Err(e) => warn!(error = %e, "parser task failed"),
            }
        }

        shutdown.cancel();
        if let Err(e) = monitor_task.await {
            warn!(error = %e, "monitor task failed");
        }
        match server_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "status endpoint stopped with an error"),
            Err(e) => warn!(error = %e, "status endpoint task failed"),
        }

        info!(
            parsed = report.parser.parsed,
            dropped = report.parser.dropped,
            written = report.writer.points_written,
            "pipeline stopped"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
