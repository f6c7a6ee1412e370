// File: race.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use chrono::Utc;
use log::{debug, info, trace, warn};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;

use crate::aggregate::{collect_records, RaceResult, RaceTiming, SlotOutcome};
use crate::barrier::{release_final_byte, send_prefixes};
use crate::config::RaceConfig;
use crate::connection::{dial_all, tls_client_config, Connection, ConnectionState};
use crate::error::{EngineResult, RaceError};
use crate::response::read_response;
use crate::state::RaceState;
use crate::target::RaceTarget;

const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Runs last-byte synchronized races against a single target.
#[derive(Debug, Clone)]
pub struct RaceEngine {
    config: RaceConfig,
}

impl RaceEngine {
    pub fn new(config: RaceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Races `request` using the configured timeout as the only deadline.
    pub async fn run(&self, target: &RaceTarget, request: &[u8]) -> EngineResult<RaceResult> {
        self.run_with_deadline(target, request, None).await
    }

    /// Races `request`, stopping at the earlier of the configured timeout and
    /// `deadline`.
    ///
    /// `request` must already be prepared (see [`crate::request::prepare_request`]).
    /// Fails only when the request is empty, TLS cannot be configured, or no
    /// connection could be opened; every other failure is reported per slot.
    pub async fn run_with_deadline(
        &self,
        target: &RaceTarget,
        request: &[u8],
        deadline: Option<Instant>,
    ) -> EngineResult<RaceResult> {
        let Some((&last_byte, prefix)) = request.split_last() else {
            return Err(RaceError::EmptyRequest);
        };

        let count = self.config.count();
        let started = Instant::now();
        let started_at = Utc::now();
        let mut deadline_at = started + self.config.timeout();
        if let Some(caller) = deadline {
            deadline_at = deadline_at.min(caller);
        }

        info!(
            "Racing {} connections against {} ({} byte request)",
            count,
            target,
            request.len()
        );

        let connector = if target.use_tls() {
            Some(TlsConnector::from(tls_client_config()?))
        } else {
            None
        };

        let mut state = RaceState::new(count);
        let mut outcomes: Vec<Option<SlotOutcome>> = (0..count).map(|_| None).collect();

        let report = dial_all(
            target,
            count,
            connector,
            deadline_at,
            self.config.connect_timeout(),
            self.config.verify_alpn(),
        )
        .await
        .ensure_usable()?;

        let mut connected = Vec::with_capacity(count);
        for (index, (connection, error)) in report
            .connections
            .into_iter()
            .zip(report.errors)
            .enumerate()
        {
            match (connection, error) {
                (Some(connection), _) => {
                    state.add_connected();
                    connected.push(connection);
                }
                (None, Some(error)) => {
                    state.add_dial_failure();
                    outcomes[index] = Some(SlotOutcome::Failed(error));
                }
                (None, None) => state.add_dial_failure(),
            }
        }
        debug!("{} of {} connections usable", state.connected(), count);

        let prefix: Arc<[u8]> = Arc::from(prefix);
        let mut primed = Vec::with_capacity(connected.len());
        for (index, result) in send_prefixes(connected, prefix).await {
            match result {
                Ok(connection) => primed.push(connection),
                Err(error) => {
                    debug!("Slot {}: {}", index, error);
                    state.add_prefix_failure();
                    outcomes[index] = Some(SlotOutcome::Failed(error));
                }
            }
        }

        let mut released = Vec::with_capacity(primed.len());
        let mut sent_times = Vec::with_capacity(primed.len());
        for (index, result) in release_final_byte(primed, last_byte).await {
            match result {
                Ok((connection, sent_at)) => {
                    state.add_released();
                    sent_times.push(sent_at);
                    released.push(connection);
                }
                Err(error) => {
                    debug!("Slot {}: {}", index, error);
                    state.add_release_failure();
                    outcomes[index] = Some(SlotOutcome::Failed(error));
                }
            }
        }

        let release_spread_us = match (sent_times.iter().min(), sent_times.iter().max()) {
            (Some(first), Some(last)) => last.duration_since(*first).as_micros() as u64,
            _ => 0,
        };
        debug!("Final bytes released within {}us", release_spread_us);

        for (index, outcome) in read_all(released).await {
            match &outcome {
                SlotOutcome::Response { .. } => state.add_response(),
                SlotOutcome::Failed(_) => state.add_read_failure(),
            }
            outcomes[index] = Some(outcome);
        }

        let records = collect_records(outcomes, self.config.body_limit());
        let timing = RaceTiming {
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            release_spread_us,
        };
        let result = RaceResult::new(
            target.to_string(),
            request_fingerprint(request),
            records,
            timing,
            state,
        );

        if result.has_divergent_statuses() {
            warn!("Divergent responses: {}", result.summary());
        } else {
            info!("{}", result.summary());
        }
        Ok(result)
    }
}

async fn read_all(connections: Vec<Connection>) -> Vec<(usize, SlotOutcome)> {
    let mut tasks = JoinSet::new();
    for connection in connections {
        tasks.spawn(read_one(connection));
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!("Read task failed: {}", e),
        }
    }
    outcomes
}

async fn read_one(mut connection: Connection) -> (usize, SlotOutcome) {
    let index = connection.index;
    let protocol = connection.negotiated_protocol();

    let parsed = {
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, &mut connection.stream);
        read_response(&mut reader).await
    };
    let outcome = match parsed {
        Ok(response) => SlotOutcome::Response { response, protocol },
        Err(error) => {
            debug!("Slot {}: {}", index, error);
            SlotOutcome::Failed(error)
        }
    };

    if let Err(e) = connection.stream.shutdown().await {
        trace!("Slot {}: shutdown failed: {}", index, e);
    }
    connection.state = ConnectionState::Closed;
    trace!("Slot {}: {:?}", index, connection);
    (index, outcome)
}

/// Short SHA-256 of the prepared request, for matching reports to requests.
pub fn request_fingerprint(request: &[u8]) -> String {
    let digest = Sha256::digest(request);
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}
