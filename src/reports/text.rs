// File: text.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::Result;

use super::{ReportConfig, ReportData, ReportGenerator};
use crate::aggregate::ResponseRecord;

const RULE: &str =
    "===============================================================================\n";

pub struct TextGenerator;

impl TextGenerator {
    pub fn new() -> Self {
        Self
    }

    fn format_status(&self, record: &ResponseRecord) -> String {
        match (&record.error, record.status_code) {
            (Some(_), _) => "[ERROR]".to_string(),
            (None, code) if record.complete => format!("[{}]  ", code),
            (None, code) => format!("[{}*] ", code),
        }
    }
}

impl ReportGenerator for TextGenerator {
    fn generate(&self, data: &ReportData, config: &ReportConfig) -> Result<String> {
        let result = &data.result;
        let state = &result.state;
        let mut output = String::new();

        output.push_str(RULE);
        output.push_str(&format!(
            "                          {}\n",
            data.title.to_uppercase()
        ));
        output.push_str(RULE);
        output.push_str(&format!(
            "Generated: {}\n",
            data.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&format!("Tool: rrace v{}\n", env!("CARGO_PKG_VERSION")));
        output.push_str(RULE);
        output.push('\n');

        output.push_str("SUMMARY\n");
        output.push_str("-------\n");
        output.push_str(&format!("{}\n\n", data.summary));
        output.push_str(&format!("Target:               {}\n", result.target));
        output.push_str(&format!(
            "Request Fingerprint:  {}\n",
            result.request_fingerprint
        ));
        output.push_str(&format!("Connections:          {}/{}\n", state.connected(), state.requested()));
        output.push_str(&format!("Final Bytes Sent:     {}\n", state.released()));
        output.push_str(&format!("Responses:            {}\n", state.responses()));
        output.push_str(&format!("Failures:             {}\n", state.failed()));
        output.push_str(&format!(
            "Release Spread:       {}us\n",
            result.timing.release_spread_us
        ));
        output.push_str(&format!(
            "Elapsed:              {}ms\n",
            result.timing.elapsed_ms
        ));

        output.push_str("\nSTATUS DISTRIBUTION\n");
        output.push_str("-------------------\n");
        for (code, count) in result.sorted_histogram() {
            let label = if code == 0 {
                "error".to_string()
            } else {
                code.to_string()
            };
            output.push_str(&format!("  {:<8} {}\n", label, count));
        }
        if result.has_divergent_statuses() {
            output.push_str("\n! Responses diverge: inspect the records below\n");
        } else {
            output.push_str("\n✓ All responses share one status\n");
        }

        output.push_str("\nRESPONSES\n");
        output.push_str("---------\n");
        for record in &result.records {
            if record.is_error() && !config.include_errors {
                continue;
            }
            output.push_str(&format!(
                "#{:<3} {} ",
                record.index,
                self.format_status(record)
            ));
            match &record.error {
                Some(error) => output.push_str(&format!("{}\n", error)),
                None => {
                    output.push_str(&format!(
                        "{} ({} bytes{})\n",
                        record.status_line.as_deref().unwrap_or(""),
                        record.body_size,
                        if record.truncated { ", truncated" } else { "" }
                    ));
                    if config.include_headers {
                        let mut headers: Vec<_> = record.headers.iter().collect();
                        headers.sort();
                        for (name, value) in headers {
                            output.push_str(&format!("       {}: {}\n", name, value));
                        }
                    }
                    if !record.body.is_empty() {
                        for line in record.body.lines() {
                            output.push_str(&format!("       | {}\n", line));
                        }
                    }
                }
            }
        }

        output.push('\n');
        output.push_str(RULE);
        output.push_str("Report generated by rrace\n");
        output.push_str(RULE);

        Ok(output)
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}
