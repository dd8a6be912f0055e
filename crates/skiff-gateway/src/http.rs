// SPDX-License-Identifier: MIT
//
// Wire codec for engine output.
//
// The engine emits a textual HTTP/1.1 message: status line, header block,
// blank line, body. `normalize_capture` in the runtime crate guarantees a
// status line is present, but the header/body boundary can still be missing
// when a script dies mid-output.

use skiff_core::error::Result;
use skiff_core::{HeaderMap, Response};
use tracing::warn;

/// Boundary between header block and body.
const HEADER_BODY_SPLIT: &str = "\r\n\r\n";

/// Parse a normalized engine capture into a [`Response`].
///
/// A capture without a header/body boundary is not recoverable as the page
/// the script meant to send, so it degrades to a synthesized 500 carrying
/// the raw output for diagnosis.
pub fn parse_engine_response(text: &str) -> Result<Response> {
    let Some((head, body)) = text.split_once(HEADER_BODY_SPLIT) else {
        warn!(bytes = text.len(), "engine capture has no header/body boundary");
        return Ok(internal_error_response(text));
    };

    let mut lines = head.split("\r\n");
    let status = match lines.next() {
        Some(status_line) => parse_status_line(status_line),
        None => 200,
    };

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            warn!(%line, "skipping malformed header line");
            continue;
        };
        headers.append(name.trim(), value.trim());
    }

    Ok(Response {
        status,
        headers,
        body: body.as_bytes().to_vec(),
    })
}

/// `HTTP/1.1 404 Not Found` → 404. The reason phrase is ignored. A status
/// line the engine mangled defaults to 200 rather than dropping the page.
fn parse_status_line(line: &str) -> u16 {
    let mut parts = line.split_whitespace();
    let looks_like_status = parts.next().is_some_and(|v| v.starts_with("HTTP/"));
    let code = parts.next().and_then(|c| c.parse::<u16>().ok());
    match (looks_like_status, code) {
        (true, Some(code)) => code,
        _ => {
            warn!(%line, "unparseable status line, defaulting to 200");
            200
        }
    }
}

/// Synthesized 500 page shown when engine output cannot be parsed.
pub fn internal_error_response(detail: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", "text/html; charset=utf-8");
    let body = format!(
        "<html><head><title>Application Error</title></head>\
         <body><h1>Application Error</h1><pre>{}</pre></body></html>",
        html_escape(detail)
    );
    Response {
        status: 500,
        headers,
        body: body.into_bytes(),
    }
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
