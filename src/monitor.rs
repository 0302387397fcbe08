//! Pipeline monitor: counts events, samples throughput, serves snapshots.
//!
//! [`MonitorService`] is the only owner of the counters. Stages report into
//! it through an [`EventReporter`](logship_core::EventReporter); readers ask
//! for a [`PipelineSnapshot`] through a [`MonitorHandle`]. Event counting and
//! throughput sampling are two arms of one `select!` loop, so nothing else
//! ever touches the counters.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use logship_core::{EventReceiver, PipelineEvent, PipelineSnapshot};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

// ---------------------------------------------------------------------------
// Queue depth
// ---------------------------------------------------------------------------

/// Something whose current depth can be read without owning it.
pub trait QueueDepth: Send + Sync {
    fn depth(&self) -> usize;
}

/// A weak sender does not keep the queue open; once every real sender is
/// gone the depth reads 0.
impl<T: Send> QueueDepth for flume::WeakSender<T> {
    fn depth(&self) -> usize {
        self.upgrade().map_or(0, |tx| tx.len())
    }
}

/// A constant depth, for runs without a real queue behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDepth(pub usize);

impl QueueDepth for FixedDepth {
    fn depth(&self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Throughput window
// ---------------------------------------------------------------------------

/// Fixed two-slot window of `handleLine` samples.
#[derive(Debug, Clone)]
pub struct ThroughputWindow {
    samples: VecDeque<u64>,
    interval: Duration,
}

impl ThroughputWindow {
    const LEN: usize = 2;

    pub fn new(interval: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(Self::LEN),
            interval,
        }
    }

    /// Record a sample and return the throughput once the window is full.
    pub fn push(&mut self, total: u64) -> Option<f64> {
        if self.samples.len() == Self::LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(total);

        let secs = self.interval.as_secs_f64();
        if self.samples.len() < Self::LEN || secs <= 0.0 {
            return None;
        }
        let delta = self.samples[1].saturating_sub(self.samples[0]);
        Some(delta as f64 / secs)
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum MonitorCommand {
    Snapshot(oneshot::Sender<PipelineSnapshot>),
}

#[derive(Debug, thiserror::Error)]
#[error("monitor is not running")]
pub struct MonitorStopped;

/// Cloneable request side of the monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<MonitorCommand>,
}

impl MonitorHandle {
    pub async fn snapshot(&self) -> Result<PipelineSnapshot, MonitorStopped> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::Snapshot(reply))
            .map_err(|_| MonitorStopped)?;
        rx.await.map_err(|_| MonitorStopped)
    }
}

pub struct MonitorService {
    events: EventReceiver,
    commands: mpsc::UnboundedReceiver<MonitorCommand>,
    raw_queue: Box<dyn QueueDepth>,
    record_queue: Box<dyn QueueDepth>,
    sample_interval: Duration,
    startup_delay: Duration,
    started: Instant,
    handle_line: u64,
    err_num: u64,
    tps: f64,
    window: ThroughputWindow,
}

impl MonitorService {
    pub fn new(
        events: EventReceiver,
        raw_queue: impl QueueDepth + 'static,
        record_queue: impl QueueDepth + 'static,
        sample_interval: Duration,
    ) -> (Self, MonitorHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let service = Self {
            events,
            commands,
            raw_queue: Box::new(raw_queue),
            record_queue: Box::new(record_queue),
            sample_interval,
            startup_delay: Duration::ZERO,
            started: Instant::now(),
            handle_line: 0,
            err_num: 0,
            tps: 0.0,
            window: ThroughputWindow::new(sample_interval),
        };
        (service, MonitorHandle { tx })
    }

    /// Hold off counting and sampling for `delay` after [`run`](Self::run)
    /// starts. Events sent meanwhile are queued, not lost, and snapshot
    /// requests are still answered (with the counters as they stand).
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.startup_delay.is_zero() {
            debug!(delay = ?self.startup_delay, "monitor start delayed");
            let delay = tokio::time::sleep(self.startup_delay);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = &mut delay => break,
                    Some(MonitorCommand::Snapshot(reply)) = self.commands.recv() => {
                        let _ = reply.send(self.snapshot());
                    }
                }
            }
        }
        info!(interval = ?self.sample_interval, "monitor started");

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.sample_interval,
            self.sample_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut events_open = true;
        let mut commands_open = true;

        loop {
            tokio::select! {
                // Events come last so a busy pipeline cannot starve the
                // sampler or snapshot requests.
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    if let Some(tps) = self.window.push(self.handle_line) {
                        self.tps = tps;
                    }
                }

                command = self.commands.recv(), if commands_open => match command {
                    Some(MonitorCommand::Snapshot(reply)) => {
                        if reply.send(self.snapshot()).is_err() {
                            debug!("snapshot requester went away");
                        }
                    }
                    None => commands_open = false,
                },

                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.count(event),
                    None => {
                        debug!("all event reporters dropped");
                        events_open = false;
                    }
                },
            }
        }

        info!(
            handle_line = self.handle_line,
            err_num = self.err_num,
            "monitor stopped"
        );
    }

    fn count(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::LineHandled => self.handle_line += 1,
            PipelineEvent::ParseError => self.err_num += 1,
        }
    }

    fn snapshot(&self) -> PipelineSnapshot {
        let uptime = Duration::from_millis(self.started.elapsed().as_millis() as u64);
        PipelineSnapshot {
            handle_line: self.handle_line,
            tps: self.tps,
            read_chan_len: self.raw_queue.depth(),
            write_chan_len: self.record_queue.depth(),
            run_time: humantime::format_duration(uptime).to_string(),
            err_num: self.err_num,
        }
    }
}

// ---------------------------------------------------------------------------
// Status endpoint
// ---------------------------------------------------------------------------

/// Serialize with one tab per indent level.
pub fn render_snapshot(snapshot: &PipelineSnapshot) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(160);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    snapshot.serialize(&mut ser)?;
    Ok(out)
}

/// Router serving `GET {path}`. Every other route is a 404.
pub fn router(handle: MonitorHandle, path: &str) -> Router {
    Router::new()
        .route(path, get(status))
        .with_state(handle)
}

async fn status(State(handle): State<MonitorHandle>) -> Response {
    let snapshot = match handle.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    };
    match render_snapshot(&snapshot) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!(error = %e, "rendering snapshot");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve `app` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "status endpoint listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}
