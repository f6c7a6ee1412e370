// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use std::path::PathBuf;

use crate::config::{DEFAULT_BODY_LIMIT, DEFAULT_COUNT};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[arg(
        short = 'r',
        long = "request",
        help = "File holding the raw HTTP request (reads stdin when omitted)"
    )]
    pub request: Option<PathBuf>,

    #[arg(long, help = "Target host (defaults to the request's Host header)")]
    pub host: Option<String>,

    #[arg(long, help = "Target port (defaults to 443, or 80 with --no-tls)")]
    pub port: Option<u16>,

    #[arg(long = "no-tls", help = "Use plain TCP instead of TLS")]
    pub no_tls: bool,

    #[arg(
        short = 'c',
        long = "count",
        default_value_t = DEFAULT_COUNT,
        help = "Number of parallel connections (max 50)"
    )]
    pub count: usize,

    #[arg(
        short = 'b',
        long = "body-limit",
        default_value_t = DEFAULT_BODY_LIMIT,
        help = "Bytes of each response body to keep (0 keeps everything)"
    )]
    pub body_limit: usize,

    #[arg(
        short = 't',
        long = "timeout",
        default_value_t = 30,
        help = "Overall race timeout in seconds"
    )]
    pub timeout: u64,

    #[arg(
        long = "verify-alpn",
        help = "Fail connections that do not negotiate http/1.1"
    )]
    pub verify_alpn: bool,

    #[arg(short = 'f', long = "format", value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    #[arg(short = 'o', long = "output", help = "Write the report to this file")]
    pub output: Option<PathBuf>,

    #[arg(long = "include-headers", help = "Show response headers in the report")]
    pub include_headers: bool,

    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short = 'q', long = "quiet", help = "Reduce output verbosity")]
    pub quiet: bool,

    #[arg(long = "no-color", help = "Disable colored output")]
    pub no_color: bool,

    #[arg(
        long = "i-have-authorization",
        help = "Confirm you are authorized to test the target"
    )]
    pub i_have_authorization: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Text => "text",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "markdown",
        }
    }
}

impl Cli {
    /// `-v` and `-q` win over `--log-level`; unknown levels fall back to warn.
    pub fn level_filter(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else if self.quiet {
            LevelFilter::Error
        } else {
            self.log_level.parse().unwrap_or(LevelFilter::Warn)
        }
    }
}
