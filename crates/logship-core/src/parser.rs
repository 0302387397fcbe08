//! LineParser — turns one raw access-log line into a [`LogRecord`].
//!
//! Only one line shape is understood:
//!
//! ```text
//! client_ip - - [timestamp] scheme "METHOD path?query HTTP/ver" status bytes "referrer" "user-agent" "x-forward" upstream_time request_time
//! ```
//!
//! # Steps
//!
//! 1. Match the whole line against the grammar. No match → [`ParseError::GrammarMismatch`].
//! 2. Parse the bracketed timestamp (`%d/%b/%Y:%H:%M:%S %z`). Failure → [`ParseError::Timestamp`].
//! 3. Split the request field on spaces; anything but three tokens → [`ParseError::RequestField`].
//! 4. Take the path of the target and percent-decode it. Control characters
//!    or a bad `%` escape → [`ParseError::Url`]. A target with a scheme or
//!    authority keeps what follows the host (possibly empty); a relative
//!    target keeps its own text.
//! 5. Bytes and timings parse permissively: a bad number becomes zero.
//!
//! Identity fields (timestamp, method, path) must be valid or the line is
//! dropped; measured values are secondary and default instead.

use crate::types::LogRecord;
use chrono::{DateTime, FixedOffset};
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Timestamp layout of the bracketed field, e.g. `04/Mar/2018:13:49:52 +0000`.
pub const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

static ACCESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(\S+)\s+(\S+)\s+(\S+)\s+",      // client ip, ident, user
        r"\[([^\]]+)\]\s+",                // timestamp
        r"([a-z]+)\s+",                    // scheme
        r#""([^"]+)"\s+"#,                 // request
        r"(\d{3})\s+(\d+)\s+",             // status, bytes
        r#""([^"]*)"\s+"(.*?)"\s+"#,       // referrer, user agent
        r#""([\d.\-, ]+)"\s+"#,            // x-forwarded-for
        r"([\d.\-]+)\s+([\d.\-]+)\s*$",    // upstream time, request time
    ))
    .expect("access-line grammar is a valid regex")
});

/// Why a line was dropped.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line does not match the access-log grammar")]
    GrammarMismatch,

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("request field {value:?} does not split into method, target and version")]
    RequestField { value: String },

    #[error("invalid request target {value:?}: {reason}")]
    Url { value: String, reason: &'static str },
}

/// Parse one line. Pure: the same bytes always give the same result.
pub fn parse_line(raw: &[u8]) -> Result<LogRecord, ParseError> {
    let line = String::from_utf8_lossy(raw);
    let caps = ACCESS_LINE
        .captures(&line)
        .ok_or(ParseError::GrammarMismatch)?;

    let field = |i: usize| caps.get(i).map_or("", |m| m.as_str());

    let timestamp = parse_timestamp(field(4))?;
    let (method, path) = parse_request(field(6))?;

    Ok(LogRecord {
        timestamp,
        bytes_sent: field(8).parse().unwrap_or(0),
        path,
        method,
        scheme: field(5).to_string(),
        status: field(7).to_string(),
        upstream_time: parse_seconds(field(12)),
        request_time: parse_seconds(field(13)),
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    DateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| ParseError::Timestamp {
        value: value.to_string(),
        source,
    })
}

/// `METHOD target HTTP/ver` → (method, path of target).
fn parse_request(value: &str) -> Result<(String, String), ParseError> {
    let tokens: Vec<&str> = value.split(' ').collect();
    let [method, target, _version] = tokens.as_slice() else {
        return Err(ParseError::RequestField {
            value: value.to_string(),
        });
    };

    let path = target_path(target).map_err(|reason| ParseError::Url {
        value: target.to_string(),
        reason,
    })?;

    Ok((method.to_string(), path))
}

/// Decoded path of a request target: `/a%20b?x` → `/a b`,
/// `http://h/p` → `/p`, `http://h` → empty, `foo` → `foo`.
fn target_path(target: &str) -> Result<String, &'static str> {
    if target.chars().any(|c| c.is_ascii_control()) {
        return Err("control character in target");
    }

    let rest = target.split(['?', '#']).next().unwrap_or_default();
    let raw = match rest.split_once("://") {
        Some((scheme, after)) if is_scheme(scheme) => authority_path(after),
        _ => match rest.strip_prefix("//") {
            Some(after) => authority_path(after),
            None => rest,
        },
    };

    if !escapes_are_valid(raw) {
        return Err("invalid percent escape");
    }
    Ok(percent_decode_str(raw).decode_utf8_lossy().into_owned())
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Everything after the host, starting at its `/`.
fn authority_path(after: &str) -> &str {
    after.find('/').map_or("", |i| &after[i..])
}

/// Every `%` must start a two-hex-digit escape.
fn escapes_are_valid(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3);
            if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

fn parse_seconds(value: &str) -> f64 {
    value.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
