//! Assertion helpers for logship harnesses.
//!
//! The store only ever sees line protocol, so most end-to-end checks pick a
//! written line apart with [`PointLine::parse`] and compare its pieces.

use std::collections::BTreeMap;

/// A line-protocol line split into its parts. Escaped separators are kept
/// escaped; tests only use values without them.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLine {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, String>,
    pub timestamp: i64,
}

impl PointLine {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split(' ');
        let (series, fields, ts) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(f), Some(t), None) => (s, f, t),
            _ => panic!("not a simple line-protocol line: {line:?}"),
        };

        let mut series = series.split(',');
        let measurement = series.next().unwrap_or_default().to_string();
        let tags = series.map(split_pair).collect();
        let fields = fields.split(',').map(split_pair).collect();
        let timestamp = ts
            .parse()
            .unwrap_or_else(|_| panic!("bad timestamp in {line:?}"));

        Self {
            measurement,
            tags,
            fields,
            timestamp,
        }
    }

    pub fn tag(&self, key: &str) -> &str {
        self.tags
            .get(key)
            .unwrap_or_else(|| panic!("tag {key:?} missing, have {:?}", self.tags))
    }
}

fn split_pair(pair: &str) -> (String, String) {
    let (k, v) = pair
        .split_once('=')
        .unwrap_or_else(|| panic!("not a key=value pair: {pair:?}"));
    (k.to_string(), v.to_string())
}

/// Assert a written line carries the given tag value.
///
/// ```rust
/// assert_tag!(line, "Path", "/foo");
/// ```
#[macro_export]
macro_rules! assert_tag {
    ($line:expr, $key:expr, $value:expr) => {{
        let point = $crate::common::assertions::PointLine::parse(&$line);
        let actual = point.tag($key);
        if actual != $value {
            panic!(
                "assert_tag! failed:\n  line: {}\n  tag {:?}\n  expected: {:?}\n  actual:   {:?}",
                $line, $key, $value, actual
            );
        }
    }};
}

/// Assert two collections hold the same items, ignoring order.
#[macro_export]
macro_rules! assert_same_set {
    ($left:expr, $right:expr) => {{
        let mut left: Vec<_> = $left.into_iter().collect();
        let mut right: Vec<_> = $right.into_iter().collect();
        left.sort();
        right.sort();
        pretty_assertions::assert_eq!(left, right, "collections differ as sets");
    }};
}
