//! Static access-log corpora used across harnesses.

/// The reference line and the record it must parse to.
pub const SAMPLE_LINE: &str = r#"172.0.0.12 - - [04/Mar/2018:13:49:52 +0000] http "GET /foo?query=t HTTP/1.0" 200 2133 "-" "KeepAliveClient" "-" 1.005 1.854"#;

/// Well-formed lines in a few shapes: other verbs, offsets, missing timings.
pub const CORPUS_VALID: &[&str] = &[
    SAMPLE_LINE,
    r#"10.1.2.3 - - [04/Mar/2018:13:49:53 +0000] https "POST /api/v1/orders HTTP/1.1" 201 512 "https://shop.example/cart" "Mozilla/5.0 (X11; Linux x86_64)" "203.0.113.7" 0.020 0.031"#,
    r#"10.1.2.4 - alice [04/Mar/2018:15:49:54 +0200] http "DELETE /api/v1/orders/42 HTTP/1.1" 204 0 "-" "curl/7.58.0" "-" 0.004 0.005"#,
    r#"10.1.2.5 - - [04/Mar/2018:13:49:55 +0000] http "GET /static/app.js?v=3 HTTP/2.0" 304 0 "-" "Mozilla/5.0" "-" - 0.000"#,
    r#"10.1.2.6 - - [04/Mar/2018:13:49:56 +0000] http "GET /healthz HTTP/1.1" 200 2 "-" "kube-health/1.27" "10.0.0.1, 10.0.0.2" 0.001 0.001"#,
    r#"10.1.2.7 - - [04/Mar/2018:13:49:57 +0000] https "PUT /api/v1/users/7 HTTP/1.1" 500 87 "-" "okhttp/4.9.0" "-" 1.500 1.502"#,
];

/// Lines that must be dropped and counted as parse errors, with the reason.
pub const CORPUS_MALFORMED: &[(&str, &str)] = &[
    ("", "empty line"),
    (
        r#"172.0.0.12 - - [04/Mar/2018:13:49:52 +0000] http "GET /foo HTTP/1.0" 200 2133 "-" "KeepAliveClient""#,
        "ten fields",
    ),
    (
        r#"172.0.0.12 - - [31/Feb/2018:13:49:52 +0000] http "GET /foo HTTP/1.0" 200 2133 "-" "KeepAliveClient" "-" 1.005 1.854"#,
        "impossible date",
    ),
    (
        r#"172.0.0.12 - - [04/Mar/2018:13:49:52 +0000] http "GET /foo" 200 2133 "-" "KeepAliveClient" "-" 1.005 1.854"#,
        "request field with two tokens",
    ),
    (
        r#"172.0.0.12 - - [04/Mar/2018:13:49:52 +0000] http "\x16\x03\x01" 400 0 "-" "-" "-" - 0.001"#,
        "TLS handshake bytes in request field",
    ),
    ("this is not an access log line", "free text"),
];

/// Build `n` distinct valid lines whose paths encode their index
/// (`/item/0`, `/item/1`, …) so order and set membership can be checked.
pub fn numbered_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            format!(
                r#"10.0.0.1 - - [04/Mar/2018:13:50:{:02} +0000] http "GET /item/{i}?page=1 HTTP/1.1" 200 {} "-" "bench" "-" 0.010 0.020"#,
                i % 60,
                100 + i
            )
        })
        .collect()
}
