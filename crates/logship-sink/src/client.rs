//! HTTP write client for the time-series store.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use logship_core::SinkDsn;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error bodies longer than this are cut before they reach the logs.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid write request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("reading response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("store answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<SinkError>,
    },
}

impl SinkError {
    /// A permanent failure will fail the same way on retry: the request
    /// itself is wrong (bad points, bad credentials, unknown database).
    /// Rate limiting is the one 4xx worth waiting out.
    pub fn is_permanent(&self) -> bool {
        match self {
            SinkError::Request(_) => true,
            SinkError::Status { status, .. } => {
                status.is_client_error() && *status != StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Sends line-protocol bodies to `<address>/write`.
#[derive(Clone)]
pub struct InfluxClient {
    client: Client<HttpConnector, Full<Bytes>>,
    write_url: String,
    timeout: Duration,
}

impl InfluxClient {
    pub fn new(dsn: &SinkDsn, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            write_url: write_url(dsn),
            timeout,
        }
    }

    pub fn write_url(&self) -> &str {
        &self.write_url
    }

    /// POST one body. Any 2xx is success.
    pub async fn write(&self, body: String) -> Result<(), SinkError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.write_url)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Full::new(Bytes::from(body)))?;

        let send = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            let body = response.into_body().collect().await?.to_bytes();
            Ok::<_, SinkError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| SinkError::Timeout(self.timeout))??;

        if status.is_success() {
            debug!(%status, "batch accepted");
            return Ok(());
        }

        let mut body = String::from_utf8_lossy(&body).trim().to_string();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(SinkError::Status { status, body })
    }
}

/// `<address>/write?db=..&precision=..[&u=..&p=..]`
fn write_url(dsn: &SinkDsn) -> String {
    let mut url = dsn.address.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("write");
    }
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("db", &dsn.database);
        query.append_pair("precision", dsn.precision.as_str());
        if !dsn.username.is_empty() {
            query.append_pair("u", &dsn.username);
            query.append_pair("p", &dsn.password);
        }
    }
    url.into()
}
