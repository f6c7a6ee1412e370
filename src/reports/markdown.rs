// File: markdown.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::Result;

use super::{ReportConfig, ReportData, ReportGenerator};
use crate::aggregate::ResponseRecord;

pub struct MarkdownGenerator;

impl MarkdownGenerator {
    pub fn new() -> Self {
        Self
    }

    fn status_badge(&self, record: &ResponseRecord) -> String {
        if record.is_error() {
            return "![Error](https://img.shields.io/badge/ERROR-red?style=flat-square)"
                .to_string();
        }
        let colour = match record.status_code {
            200..=299 => "brightgreen",
            300..=399 => "blue",
            400..=499 => "orange",
            _ => "red",
        };
        format!(
            "![{code}](https://img.shields.io/badge/{code}-{colour}?style=flat-square)",
            code = record.status_code,
            colour = colour
        )
    }

    fn escape_markdown(&self, text: &str) -> String {
        text.replace("|", "\\|")
            .replace("*", "\\*")
            .replace("_", "\\_")
            .replace("`", "\\`")
            .replace("#", "\\#")
            .replace("[", "\\[")
            .replace("]", "\\]")
    }
}

impl ReportGenerator for MarkdownGenerator {
    fn generate(&self, data: &ReportData, config: &ReportConfig) -> Result<String> {
        let result = &data.result;
        let state = &result.state;
        let mut md = String::new();

        md.push_str(&format!("# {}\n\n", data.title));
        md.push_str(&format!(
            "**Generated:** {} | **Tool:** rrace v{}\n\n",
            data.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            env!("CARGO_PKG_VERSION")
        ));
        md.push_str("---\n\n");

        md.push_str("## Summary\n\n");
        md.push_str(&format!("{}\n\n", data.summary));
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Target | `{}` |\n", result.target));
        md.push_str(&format!(
            "| Request Fingerprint | `{}` |\n",
            result.request_fingerprint
        ));
        md.push_str(&format!(
            "| Connections | {}/{} |\n",
            state.connected(),
            state.requested()
        ));
        md.push_str(&format!("| Final Bytes Sent | {} |\n", state.released()));
        md.push_str(&format!("| Responses | {} |\n", state.responses()));
        md.push_str(&format!("| Failures | {} |\n", state.failed()));
        md.push_str(&format!(
            "| Release Spread | {}us |\n",
            result.timing.release_spread_us
        ));
        md.push_str(&format!("| Elapsed | {}ms |\n\n", result.timing.elapsed_ms));

        md.push_str("## Status Distribution\n\n");
        md.push_str("| Status | Count |\n");
        md.push_str("|--------|-------|\n");
        for (code, count) in result.sorted_histogram() {
            let label = if code == 0 {
                "error".to_string()
            } else {
                code.to_string()
            };
            md.push_str(&format!("| {} | {} |\n", label, count));
        }
        md.push('\n');
        if result.has_divergent_statuses() {
            md.push_str("> **Responses diverge.** Inspect the records below.\n\n");
        }

        md.push_str("## Responses\n\n");
        md.push_str("| # | Status | Size | Body |\n");
        md.push_str("|---|--------|------|------|\n");
        for record in &result.records {
            if record.is_error() && !config.include_errors {
                continue;
            }
            let body = match &record.error {
                Some(error) => self.escape_markdown(error),
                None => {
                    let mut body = self.escape_markdown(&record.body.replace('\n', " "));
                    if record.truncated {
                        body.push_str(" …");
                    }
                    body
                }
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                record.index,
                self.status_badge(record),
                record.body_size,
                body
            ));
        }

        if config.include_headers {
            md.push_str("\n## Headers\n\n");
            for record in result.records.iter().filter(|r| !r.headers.is_empty()) {
                md.push_str(&format!("### Response {}\n\n", record.index));
                let mut headers: Vec<_> = record.headers.iter().collect();
                headers.sort();
                for (name, value) in headers {
                    md.push_str(&format!(
                        "- **{}:** {}\n",
                        name,
                        self.escape_markdown(value)
                    ));
                }
                md.push('\n');
            }
        }

        md.push_str("\n---\n\n");
        md.push_str("*Report generated by rrace*\n");

        Ok(md)
    }

    fn file_extension(&self) -> &'static str {
        "md"
    }

    fn content_type(&self) -> &'static str {
        "text/markdown"
    }
}
