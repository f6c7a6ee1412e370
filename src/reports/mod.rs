// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aggregate::RaceResult;

pub mod json;
pub mod markdown;
pub mod text;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub title: String,
    pub summary: String,
    pub result: RaceResult,
}

impl ReportData {
    pub fn new(result: RaceResult) -> Self {
        Self {
            generated_at: Utc::now(),
            title: format!("Race condition test against {}", result.target),
            summary: result.summary(),
            result,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportConfig {
    /// Show response headers for every record.
    pub include_headers: bool,
    /// Show error records alongside responses.
    pub include_errors: bool,
}

pub trait ReportGenerator {
    fn generate(&self, data: &ReportData, config: &ReportConfig) -> Result<String>;
    fn file_extension(&self) -> &'static str;
    fn content_type(&self) -> &'static str;
}

pub struct ReportEngine;

impl ReportEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn generate_report<P: AsRef<Path>>(
        &self,
        format: &str,
        data: &ReportData,
        config: &ReportConfig,
        output_path: Option<P>,
    ) -> Result<String> {
        let generator = self.get_generator(format)?;
        let content = generator.generate(data, config)?;

        if let Some(path) = output_path {
            let path = path.as_ref();
            std::fs::write(path, &content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }

        Ok(content)
    }

    pub fn get_generator(&self, format: &str) -> Result<Box<dyn ReportGenerator>> {
        match format.to_lowercase().as_str() {
            "json" => Ok(Box::new(json::JsonGenerator::new())),
            "text" | "txt" => Ok(Box::new(text::TextGenerator::new())),
            "markdown" | "md" => Ok(Box::new(markdown::MarkdownGenerator::new())),
            _ => Err(anyhow::anyhow!("Unsupported report format: {}", format)),
        }
    }
}
