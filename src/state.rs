// File: state.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};

/// Per-run counters, updated only by the task driving the race.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceState {
    requested: usize,
    connected: usize,
    dial_failures: usize,
    prefix_failures: usize,
    released: usize,
    release_failures: usize,
    responses: usize,
    read_failures: usize,
}

impl RaceState {
    pub fn new(requested: usize) -> RaceState {
        RaceState {
            requested,
            ..Default::default()
        }
    }

    pub fn add_connected(&mut self) {
        self.connected += 1;
    }

    pub fn add_dial_failure(&mut self) {
        self.dial_failures += 1;
    }

    pub fn add_prefix_failure(&mut self) {
        self.prefix_failures += 1;
    }

    pub fn add_released(&mut self) {
        self.released += 1;
    }

    pub fn add_release_failure(&mut self) {
        self.release_failures += 1;
    }

    pub fn add_response(&mut self) {
        self.responses += 1;
    }

    pub fn add_read_failure(&mut self) {
        self.read_failures += 1;
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn connected(&self) -> usize {
        self.connected
    }

    pub fn dial_failures(&self) -> usize {
        self.dial_failures
    }

    pub fn prefix_failures(&self) -> usize {
        self.prefix_failures
    }

    pub fn released(&self) -> usize {
        self.released
    }

    pub fn release_failures(&self) -> usize {
        self.release_failures
    }

    pub fn responses(&self) -> usize {
        self.responses
    }

    pub fn read_failures(&self) -> usize {
        self.read_failures
    }

    pub fn failed(&self) -> usize {
        self.dial_failures + self.prefix_failures + self.release_failures + self.read_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut state = RaceState::new(5);
        state.add_connected();
        state.add_connected();
        state.add_dial_failure();
        state.add_prefix_failure();
        state.add_released();
        state.add_response();
        state.add_read_failure();

        assert_eq!(state.requested(), 5);
        assert_eq!(state.connected(), 2);
        assert_eq!(state.released(), 1);
        assert_eq!(state.responses(), 1);
        assert_eq!(state.failed(), 3);
    }
}
