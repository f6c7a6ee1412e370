// File: request.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, trace};
use std::collections::HashMap;

const CRLF: &str = "\r\n";
const HEADER_TERMINATOR: &str = "\r\n\r\n";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub host: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Normalizes line endings and recomputes `Content-Length` so the target
/// never rejects the request over a length mismatch.
pub fn prepare_request(raw: &str) -> Vec<u8> {
    let normalized = normalize_line_endings(raw);
    let fixed = fix_content_length(&normalized);
    trace!(
        "Prepared request: {} bytes in, {} bytes out",
        raw.len(),
        fixed.len()
    );
    fixed.into_bytes()
}

/// Converts every line ending to CRLF and makes sure the header block is
/// closed by an empty line. A body that follows an existing header
/// terminator is left as-is.
pub fn normalize_line_endings(raw: &str) -> String {
    let mut normalized = raw.replace("\r\n", "\n").replace('\n', CRLF);
    if !normalized.contains(HEADER_TERMINATOR) {
        if normalized.ends_with(CRLF) {
            normalized.push_str(CRLF);
        } else {
            normalized.push_str(HEADER_TERMINATOR);
        }
    }
    normalized
}

/// Rewrites `Content-Length` in place to the byte length of the body,
/// appending it after the last header when it is missing and a body exists.
pub fn fix_content_length(raw: &str) -> String {
    let Some(idx) = raw.find(HEADER_TERMINATOR) else {
        return raw.to_string();
    };

    let header_section = &raw[..idx];
    let body = &raw[idx + HEADER_TERMINATOR.len()..];
    let length_header = format!("Content-Length: {}", body.len());

    let mut rebuilt = Vec::new();
    let mut has_content_length = false;
    for (position, line) in header_section.split(CRLF).enumerate() {
        if position > 0 && is_header(line, "content-length") {
            if !has_content_length {
                debug!("Replacing '{}' with '{}'", line.trim(), length_header);
                rebuilt.push(length_header.clone());
            }
            has_content_length = true;
        } else {
            rebuilt.push(line.to_string());
        }
    }

    if !has_content_length && !body.is_empty() {
        debug!("Adding missing '{}'", length_header);
        rebuilt.push(length_header);
    }

    format!("{}{}{}", rebuilt.join(CRLF), HEADER_TERMINATOR, body)
}

fn is_header(line: &str, name: &str) -> bool {
    match line.split_once(':') {
        Some((key, _)) => key.trim().eq_ignore_ascii_case(name),
        None => false,
    }
}

/// Splits a raw request into request line, headers and body. Used to find
/// the target host when none is given explicitly.
pub fn parse_raw_request(raw: &str) -> ParsedRequest {
    let mut result = ParsedRequest::default();
    let raw = raw.replace("\r\n", "\n");

    let (header_section, body) = match raw.split_once("\n\n") {
        Some((headers, body)) => (headers, body),
        None => (raw.as_str(), ""),
    };
    result.body = body.to_string();

    let mut lines = header_section.lines();
    if let Some(request_line) = lines.next() {
        let mut parts = request_line.trim().splitn(3, ' ');
        if let (Some(method), Some(path)) = (parts.next(), parts.next()) {
            result.method = method.to_string();
            result.path = path.to_string();
        }
    }

    for line in lines {
        let line = line.trim();
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim().to_string();
            if key.eq_ignore_ascii_case("host") {
                result.host = Some(value.clone());
            }
            result.headers.insert(key.to_string(), value);
        }
    }

    result
}
