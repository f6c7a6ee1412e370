// File: target.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineResult, RaceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceTarget {
    host: String,
    port: u16,
    use_tls: bool,
}

impl RaceTarget {
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
        }
    }

    /// Builds a target from a host that may carry its own port
    /// (`example.com:8443`, `[::1]:8443`, `[::1]`, `::1`).
    ///
    /// An explicit `port` wins over an embedded one. Without either the port
    /// follows the scheme: 443 with TLS, 80 without.
    pub fn resolve(host: &str, port: Option<u16>, use_tls: bool) -> EngineResult<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(RaceError::InvalidTarget(
                "host is required (provide it explicitly or in the Host header)".to_string(),
            ));
        }
        if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(RaceError::InvalidTarget(format!(
                "host contains invalid characters: {:?}",
                host
            )));
        }

        let (bare_host, embedded_port) = split_host_port(host)?;
        if bare_host.is_empty() {
            return Err(RaceError::InvalidTarget(format!("no host in {:?}", host)));
        }

        let port = port
            .or(embedded_port)
            .unwrap_or(if use_tls { 443 } else { 80 });
        if port == 0 {
            return Err(RaceError::InvalidTarget("port must not be 0".to_string()));
        }

        Ok(Self::new(bare_host, port, use_tls))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// `host:port` with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for RaceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_tls { "https" } else { "http" };
        write!(f, "{}://{}", scheme, self.authority())
    }
}

fn split_host_port(host: &str) -> EngineResult<(String, Option<u16>)> {
    if let Some(rest) = host.strip_prefix('[') {
        let (inner, tail) = rest.split_once(']').ok_or_else(|| {
            RaceError::InvalidTarget(format!("missing ']' in host {:?}", host))
        })?;
        let port = match tail {
            "" => None,
            _ => Some(parse_port(tail.strip_prefix(':').unwrap_or(tail), host)?),
        };
        return Ok((inner.to_string(), port));
    }

    // A bare IPv6 literal has more than one colon and no port.
    match host.matches(':').count() {
        0 => Ok((host.to_string(), None)),
        1 => {
            let (name, port) = host.split_once(':').unwrap_or((host, ""));
            Ok((name.to_string(), Some(parse_port(port, host)?)))
        }
        _ => Ok((host.to_string(), None)),
    }
}

fn parse_port(port: &str, host: &str) -> EngineResult<u16> {
    port.parse::<u16>()
        .map_err(|_| RaceError::InvalidTarget(format!("invalid port in host {:?}", host)))
}
