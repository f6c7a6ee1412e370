// File: race_cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use colored::*;
use log::{debug, info};
use std::io::{self, Read};
use std::time::Duration;

use crate::aggregate::RaceResult;
use crate::cli::Cli;
use crate::config::RaceConfig;
use crate::race::RaceEngine;
use crate::reports::{ReportConfig, ReportData, ReportEngine};
use crate::request::{parse_raw_request, prepare_request};
use crate::target::RaceTarget;

/// Console chatter goes to stderr so stdout carries nothing but the report.
pub async fn run_race(cli: &Cli) -> Result<()> {
    check_request_source(cli)?;
    confirm_authorization(cli.i_have_authorization)?;

    let raw = load_request(cli)?;
    let target = build_target(cli, &raw)?;
    let config = build_config(cli);
    let request = prepare_request(&raw);
    debug!(
        "Prepared {} byte request for {} ({} connections)",
        request.len(),
        target,
        config.count()
    );

    eprintln!(
        "Racing {} connections against {}",
        config.count().to_string().bold(),
        target.to_string().cyan()
    );

    let engine = RaceEngine::new(config);
    let result = engine
        .run(&target, &request)
        .await
        .with_context(|| format!("Race against {} failed", target))?;

    display_summary(&result);

    if let Some(report) = emit_report(cli, result)? {
        println!("{}", report);
    }

    Ok(())
}

/// Renders the report in the requested format. With `--output` it is written
/// to that file and nothing is returned; otherwise the text is returned for
/// stdout.
pub fn emit_report(cli: &Cli, result: RaceResult) -> Result<Option<String>> {
    let data = ReportData::new(result);
    let report_config = ReportConfig {
        include_headers: cli.include_headers,
        include_errors: true,
    };
    let report = ReportEngine::new().generate_report(
        cli.format.as_str(),
        &data,
        &report_config,
        cli.output.as_ref(),
    )?;

    match &cli.output {
        Some(path) => {
            info!("Report written to {}", path.display());
            eprintln!("\nReport saved to: {}", path.display());
            Ok(None)
        }
        None => Ok(Some(report)),
    }
}

fn confirm_authorization(preconfirmed: bool) -> Result<()> {
    eprintln!("{}", "=".repeat(80).bright_red());
    eprintln!(
        "{}",
        "HTTP/1.1 Last-Byte Race Condition Tester".bright_red().bold()
    );
    eprintln!("{}", "=".repeat(80).bright_red());
    eprintln!();
    eprintln!(
        "{}",
        "WARNING: This tool fires concurrent state-changing requests."
            .bright_yellow()
            .bold()
    );
    eprintln!("   Racing a live endpoint can:");
    eprintln!("   - Redeem coupons, transfer funds or create records more than once");
    eprintln!("   - Corrupt application state in ways that are hard to undo");
    eprintln!("   - Trigger fraud detection and incident response");
    eprintln!();
    eprintln!("{}", "LEGAL REQUIREMENT:".bright_red().bold());
    eprintln!("   You MUST have explicit written authorization to test this target.");
    eprintln!();

    if preconfirmed {
        return Ok(());
    }

    eprintln!(
        "{}",
        "Do you have explicit authorization to test this target? (yes/NO):".bright_yellow()
    );
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    if input.trim().to_lowercase() != "yes" {
        anyhow::bail!(
            "Authorization not confirmed. Use --i-have-authorization only if you have proper authorization."
        );
    }
    eprintln!(
        "{}",
        "Proceeding with authorized security testing...".green()
    );
    eprintln!();
    Ok(())
}

fn reads_stdin(cli: &Cli) -> bool {
    cli.request
        .as_ref()
        .map_or(true, |path| path.as_os_str() == "-")
}

/// A request piped through stdin would be consumed as the answer to the
/// authorization prompt, so that mode requires `--i-have-authorization`.
pub fn check_request_source(cli: &Cli) -> Result<()> {
    if reads_stdin(cli) && !cli.i_have_authorization {
        anyhow::bail!(
            "Reading the request from stdin leaves no way to answer the authorization prompt. Pass --i-have-authorization or give the request file with -r <FILE>."
        );
    }
    Ok(())
}

fn load_request(cli: &Cli) -> Result<String> {
    let raw = match cli.request.as_ref().filter(|_| !reads_stdin(cli)) {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request from {}", path.display()))?,
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read request from stdin")?;
            raw
        }
    };
    if raw.trim().is_empty() {
        anyhow::bail!("Request is empty");
    }
    Ok(raw)
}

/// `--host` wins; otherwise the Host header of the raw request names the target.
pub fn build_target(cli: &Cli, raw: &str) -> Result<RaceTarget> {
    let host = match &cli.host {
        Some(host) => host.clone(),
        None => parse_raw_request(raw).host.unwrap_or_default(),
    };
    Ok(RaceTarget::resolve(&host, cli.port, !cli.no_tls)?)
}

pub fn build_config(cli: &Cli) -> RaceConfig {
    let mut config = RaceConfig::new();
    config.set_count(cli.count);
    config.set_body_limit(cli.body_limit);
    config.set_timeout(Duration::from_secs(cli.timeout));
    config.set_verify_alpn(cli.verify_alpn);
    config
}

fn display_summary(result: &RaceResult) {
    eprintln!("\n{}", "Race Summary".bold());
    eprintln!("================");
    for (code, count) in result.sorted_histogram() {
        let label = match code {
            0 => "error".red(),
            200..=299 => code.to_string().green(),
            300..=399 => code.to_string().blue(),
            400..=499 => code.to_string().yellow(),
            _ => code.to_string().red(),
        };
        eprintln!("  {:>6}  {}", label, count);
    }
    eprintln!(
        "  release spread {}us, elapsed {}ms",
        result.timing.release_spread_us, result.timing.elapsed_ms
    );
    if result.has_divergent_statuses() {
        eprintln!(
            "{} {}",
            "⚠".yellow().bold(),
            "Responses diverge, the endpoint may be racy".yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::test_support::sample_result;
    use clap::Parser;
    use tempfile::TempDir;

    const RAW: &str = "POST /redeem HTTP/1.1\nHost: shop.test:8443\n\ncode=ABC";

    #[test]
    fn test_target_from_host_header() {
        let cli = Cli::parse_from(["rrace"]);
        let target = build_target(&cli, RAW).unwrap();
        assert_eq!(target.host(), "shop.test");
        assert_eq!(target.port(), 8443);
        assert!(target.use_tls());
    }

    #[test]
    fn test_explicit_host_and_port_win() {
        let cli = Cli::parse_from(["rrace", "--host", "10.0.0.5", "--port", "8080", "--no-tls"]);
        let target = build_target(&cli, RAW).unwrap();
        assert_eq!(target.to_string(), "http://10.0.0.5:8080");
    }

    #[test]
    fn test_missing_host_is_an_error() {
        let cli = Cli::parse_from(["rrace"]);
        assert!(build_target(&cli, "GET / HTTP/1.1\n\n").is_err());
    }

    #[test]
    fn test_stdin_request_needs_preconfirmed_authorization() {
        let cli = Cli::parse_from(["rrace", "--no-tls"]);
        let err = check_request_source(&cli).unwrap_err();
        assert!(err.to_string().contains("--i-have-authorization"));

        let cli = Cli::parse_from(["rrace", "-r", "-"]);
        assert!(check_request_source(&cli).is_err());

        let cli = Cli::parse_from(["rrace", "-r", "-", "--i-have-authorization"]);
        assert!(check_request_source(&cli).is_ok());
    }

    #[test]
    fn test_request_file_keeps_the_prompt() {
        let cli = Cli::parse_from(["rrace", "-r", "req.txt"]);
        assert!(check_request_source(&cli).is_ok());
        assert!(!reads_stdin(&cli));
    }

    #[test]
    fn test_json_report_on_stdout_is_pure_json() {
        let cli = Cli::parse_from(["rrace", "-f", "json"]);
        let stdout = emit_report(&cli, sample_result()).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        assert_eq!(value["result"]["records"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_report_file_leaves_stdout_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("race.json");
        let cli = Cli::parse_from(["rrace", "-f", "json", "-o", path.to_str().unwrap()]);

        assert!(emit_report(&cli, sample_result()).unwrap().is_none());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&written).is_ok());
    }

    #[test]
    fn test_config_from_flags() {
        let cli = Cli::parse_from(["rrace", "-c", "99", "-b", "0", "-t", "5", "--verify-alpn"]);
        let config = build_config(&cli);
        assert_eq!(config.count(), 50);
        assert_eq!(config.body_limit(), 0);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert!(config.verify_alpn());
    }
}
