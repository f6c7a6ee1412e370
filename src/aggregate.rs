// File: aggregate.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::RaceError;
use crate::response::ParsedResponse;
use crate::state::RaceState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub index: usize,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_line: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub body: String,
    /// Body length before truncation.
    pub body_size: usize,
    pub truncated: bool,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseRecord {
    pub fn failed(index: usize, error: &RaceError) -> Self {
        Self {
            index,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn from_response(
        index: usize,
        response: ParsedResponse,
        protocol: Option<String>,
        body_limit: usize,
    ) -> Self {
        let text = String::from_utf8_lossy(&response.body);
        let (body, truncated) = truncate_body(&text, body_limit);
        let body = body.to_string();
        Self {
            index,
            status_code: response.status_code,
            status_line: Some(response.status_line),
            body,
            body_size: response.body.len(),
            truncated,
            complete: response.complete,
            headers: response.headers,
            protocol,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Terminal state of one slot, produced by exactly one task.
#[derive(Debug)]
pub enum SlotOutcome {
    Failed(RaceError),
    Response {
        response: ParsedResponse,
        protocol: Option<String>,
    },
}

/// Cuts `body` to at most `limit` bytes without splitting a character; a
/// limit of zero keeps everything.
pub fn truncate_body(body: &str, limit: usize) -> (&str, bool) {
    if limit == 0 || body.len() <= limit {
        return (body, false);
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    (&body[..end], true)
}

pub fn histogram(records: &[ResponseRecord]) -> HashMap<u16, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(record.status_code).or_insert(0) += 1;
    }
    counts
}

/// Turns the per-slot outcomes into one record per slot, in slot order.
/// A slot nobody reported on gets an error record.
pub fn collect_records(outcomes: Vec<Option<SlotOutcome>>, body_limit: usize) -> Vec<ResponseRecord> {
    outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Some(SlotOutcome::Response { response, protocol }) => {
                ResponseRecord::from_response(index, response, protocol, body_limit)
            }
            Some(SlotOutcome::Failed(error)) => ResponseRecord::failed(index, &error),
            None => ResponseRecord::failed(
                index,
                &RaceError::TaskAborted("no outcome recorded".to_string()),
            ),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceTiming {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Gap between the first and last final-byte write to return.
    pub release_spread_us: u64,
}

impl Default for RaceTiming {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_ms: 0,
            release_spread_us: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub target: String,
    pub request_fingerprint: String,
    pub records: Vec<ResponseRecord>,
    /// Status code to count. Iteration order carries no meaning.
    pub histogram: HashMap<u16, usize>,
    pub timing: RaceTiming,
    pub state: RaceState,
}

impl RaceResult {
    pub fn new(
        target: String,
        request_fingerprint: String,
        records: Vec<ResponseRecord>,
        timing: RaceTiming,
        state: RaceState,
    ) -> Self {
        let histogram = histogram(&records);
        Self {
            target,
            request_fingerprint,
            records,
            histogram,
            timing,
            state,
        }
    }

    /// Histogram entries ordered by status code, for display.
    pub fn sorted_histogram(&self) -> Vec<(u16, usize)> {
        let mut entries: Vec<(u16, usize)> =
            self.histogram.iter().map(|(code, count)| (*code, *count)).collect();
        entries.sort_unstable();
        entries
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .sorted_histogram()
            .iter()
            .map(|(code, count)| format!("{}x {}", count, code))
            .collect();
        format!(
            "{} requests sent, responses: {}",
            self.records.len(),
            parts.join(", ")
        )
    }

    /// True when responses disagree on the status code, the usual first hint
    /// that the race changed server-side behaviour.
    pub fn has_divergent_statuses(&self) -> bool {
        self.histogram.keys().filter(|code| **code != 0).count() > 1
    }
}
