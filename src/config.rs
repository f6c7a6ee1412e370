// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::time::Duration;

pub const DEFAULT_COUNT: usize = 10;
pub const MAX_COUNT: usize = 50;
pub const DEFAULT_BODY_LIMIT: usize = 500;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaceConfig {
    count: usize,
    body_limit: usize,
    timeout: Duration,
    connect_timeout: Duration,
    verify_alpn: bool,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RaceConfig {
    pub fn new() -> Self {
        Self {
            count: DEFAULT_COUNT,
            body_limit: DEFAULT_BODY_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verify_alpn: false,
        }
    }

    /// Zero selects the default; anything above the ceiling is capped.
    pub fn set_count(&mut self, count: usize) {
        self.count = match count {
            0 => DEFAULT_COUNT,
            n => n.min(MAX_COUNT),
        };
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Zero disables truncation.
    pub fn set_body_limit(&mut self, body_limit: usize) {
        self.body_limit = body_limit;
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) {
        self.connect_timeout = if connect_timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            connect_timeout
        };
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_verify_alpn(&mut self, verify_alpn: bool) {
        self.verify_alpn = verify_alpn;
    }

    pub fn verify_alpn(&self) -> bool {
        self.verify_alpn
    }
}
