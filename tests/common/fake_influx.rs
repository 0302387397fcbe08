//! Fake InfluxDB write endpoint for integration tests.
//!
//! Spins up a minimal `axum` HTTP server on a random TCP port bound to
//! 127.0.0.1. Serves `POST /write`, recording every request body and query
//! string. Responses default to `204 No Content`; queue failures with
//! [`FakeInflux::fail_next`] to exercise retry and drop paths, and slow every
//! write down with [`FakeInflux::set_write_delay`] to back the pipeline up.
//!
//! # Example
//!
//! ```rust,no_run
//! let influx = FakeInflux::start().await.unwrap();
//! influx.fail_next(StatusCode::SERVICE_UNAVAILABLE, 2).await;
//! // point a writer at influx.base_url()
//! let lines = influx.wait_for_lines(3, Duration::from_secs(5)).await;
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};

/// One request as received.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub query: HashMap<String, String>,
    pub body: String,
}

#[derive(Default)]
struct InfluxState {
    accepted: Vec<WriteRequest>,
    rejected: usize,
    failures: VecDeque<StatusCode>,
    write_delay: Duration,
}

#[derive(Clone, Default)]
struct Shared {
    state: Arc<Mutex<InfluxState>>,
    changed: Arc<Notify>,
}

/// Handle to the running fake server.
pub struct FakeInflux {
    addr: SocketAddr,
    shared: Shared,
}

impl FakeInflux {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Shared::default();

        let app = Router::new()
            .route("/write", post(write))
            .with_state(shared.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, shared })
    }

    /// Base URL for the DSN (e.g. `http://127.0.0.1:PORT`).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer the next `times` writes with `status` instead of 204.
    pub async fn fail_next(&self, status: StatusCode, times: usize) {
        let mut state = self.shared.state.lock().await;
        state.failures.extend(std::iter::repeat(status).take(times));
    }

    /// Hold every following write for `delay` before answering it.
    pub async fn set_write_delay(&self, delay: Duration) {
        self.shared.state.lock().await.write_delay = delay;
    }

    /// Requests answered with 2xx, in arrival order.
    pub async fn accepted(&self) -> Vec<WriteRequest> {
        self.shared.state.lock().await.accepted.clone()
    }

    /// Number of requests answered with an error status.
    pub async fn rejected(&self) -> usize {
        self.shared.state.lock().await.rejected
    }

    /// All accepted line-protocol lines, in arrival order.
    pub async fn lines(&self) -> Vec<String> {
        self.accepted()
            .await
            .iter()
            .flat_map(|w| w.body.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Wait until at least `n` lines were accepted, or panic after `timeout`.
    pub async fn wait_for_lines(&self, n: usize, timeout: Duration) -> Vec<String> {
        let wait = async {
            loop {
                let changed = self.shared.changed.notified();
                let lines = self.lines().await;
                if lines.len() >= n {
                    return lines;
                }
                changed.await;
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(lines) => lines,
            Err(_) => panic!(
                "fake influx: expected {n} lines within {timeout:?}, got {:?}",
                self.lines().await
            ),
        }
    }
}

async fn write(
    State(shared): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> impl IntoResponse {
    let delay = shared.state.lock().await.write_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut state = shared.state.lock().await;
    let status = match state.failures.pop_front() {
        Some(status) => {
            state.rejected += 1;
            status
        }
        None => {
            state.accepted.push(WriteRequest { query, body });
            StatusCode::NO_CONTENT
        }
    };
    drop(state);
    shared.changed.notify_waiters();
    status
}
