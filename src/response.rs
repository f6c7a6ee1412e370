// File: response.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! HTTP/1.1 response reader working directly on a socket stream.
//!
//! Only a failure on the status line is an error. Anything that goes wrong
//! afterwards yields a response with `complete == false` holding whatever was
//! assembled up to that point.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{EngineResult, RaceError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub status_line: String,
    pub status_code: u16,
    /// Lowercased header names; the last occurrence of a name wins.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub complete: bool,
}

impl ParsedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn framing(&self) -> BodyFraming {
        if self
            .header("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
        {
            return BodyFraming::Chunked;
        }
        match self
            .header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            Some(length) if length > 0 => BodyFraming::Length(length),
            _ => BodyFraming::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Chunked,
    Length(u64),
    None,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkedBody {
    pub body: Vec<u8>,
    pub complete: bool,
}

/// Second space-delimited token of the status line, 0 when it is missing or
/// not numeric. Accepts both `HTTP/1.1 200 OK` and `HTTP/2 200`.
pub fn parse_status_code(status_line: &str) -> u16 {
    status_line
        .split(' ')
        .nth(1)
        .and_then(|code| code.trim().parse::<u16>().ok())
        .unwrap_or(0)
}

pub async fn read_response<R>(reader: &mut R) -> EngineResult<ParsedResponse>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    match reader.read_until(b'\n', &mut line).await {
        Ok(0) => {
            return Err(RaceError::StatusLine(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before status line",
            )))
        }
        Ok(_) => {}
        Err(e) => return Err(RaceError::StatusLine(e)),
    }

    let status_line = String::from_utf8_lossy(&line).trim().to_string();
    let mut response = ParsedResponse {
        status_code: parse_status_code(&status_line),
        status_line,
        ..Default::default()
    };
    trace!("Status line: {}", response.status_line);

    if let Err(e) = read_headers(reader, &mut response.headers).await {
        debug!("Header read cut short after status line: {}", e);
        return Ok(response);
    }

    match response.framing() {
        BodyFraming::Chunked => {
            let chunked = read_chunked_body(reader).await;
            response.body = chunked.body;
            response.complete = chunked.complete;
        }
        BodyFraming::Length(length) => {
            let (body, complete) = read_fixed_body(reader, length).await;
            response.body = body;
            response.complete = complete;
        }
        BodyFraming::None => response.complete = true,
    }

    debug!(
        "Read response {} ({} body bytes, complete={})",
        response.status_code,
        response.body.len(),
        response.complete
    );
    Ok(response)
}

async fn read_headers<R>(reader: &mut R, headers: &mut HashMap<String, String>) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside header block",
            ));
        }

        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
}

/// Reads up to `length` bytes. A stream that ends early or fails yields the
/// bytes that did arrive.
async fn read_fixed_body<R>(reader: &mut R, length: u64) -> (Vec<u8>, bool)
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    let result = (&mut *reader).take(length).read_to_end(&mut body).await;
    if let Err(e) = result {
        debug!("Body read failed after {} of {} bytes: {}", body.len(), length, e);
    }
    let complete = body.len() as u64 == length;
    (body, complete)
}

/// Decodes a chunked body up to and including the terminating zero-size
/// chunk and its trailer section.
///
/// A size line that is not hexadecimal stops decoding and returns the bytes
/// gathered so far, as does a stream that ends or fails mid-body.
pub async fn read_chunked_body<R>(reader: &mut R) -> ChunkedBody
where
    R: AsyncBufRead + Unpin,
{
    let mut result = ChunkedBody::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => return result,
            Ok(_) => {}
        }

        let size_line = String::from_utf8_lossy(&line);
        let size_token = size_line.split(';').next().unwrap_or("").trim();
        let size = match u64::from_str_radix(size_token, 16) {
            Ok(size) => size,
            Err(_) => {
                debug!("Malformed chunk size line {:?}", size_line.trim());
                return result;
            }
        };

        if size == 0 {
            skip_trailers(reader).await;
            result.complete = true;
            return result;
        }

        let before = result.body.len();
        let read = (&mut *reader)
            .take(size)
            .read_to_end(&mut result.body)
            .await;
        if read.is_err() || ((result.body.len() - before) as u64) < size {
            return result;
        }

        line.clear();
        if reader.read_until(b'\n', &mut line).await.is_err() {
            return result;
        }
    }
}

async fn skip_trailers<R>(reader: &mut R)
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) if line.iter().all(|b| b.is_ascii_whitespace()) => return,
            Ok(_) => trace!("Skipping trailer {:?}", String::from_utf8_lossy(&line)),
        }
    }
}
