// File: barrier.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Prefix-then-sync send protocol.
//!
//! Every connection first receives the whole request except its last byte.
//! Once all of those writes have been joined, a single [`ReleaseGate`] wakes
//! every writer at once and each one sends its remaining byte.
//!
//! The gate gives process-local simultaneity of the final `write` calls only.
//! Kernel scheduling, NIC queues and TCP buffering add jitter the process cannot
//! see, so the order in which the server observes the final bytes is not
//! guaranteed. Fewer connections and a target with stable RTT narrow the window.

use log::{debug, trace};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::connection::{Connection, ConnectionState};
use crate::error::RaceError;

/// Single-use broadcast gate: opened at most once, wakes every waiter.
pub struct ReleaseGate {
    tx: watch::Sender<bool>,
}

pub struct GateWaiter {
    rx: watch::Receiver<bool>,
}

impl ReleaseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn waiter(&self) -> GateWaiter {
        GateWaiter {
            rx: self.tx.subscribe(),
        }
    }

    pub fn waiters(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Consumes the gate so it cannot be opened twice.
    pub fn open(self) {
        self.tx.send_replace(true);
    }
}

impl Default for ReleaseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GateWaiter {
    /// Resolves to `true` when the gate opens and `false` when it is dropped
    /// without opening.
    pub async fn wait(mut self) -> bool {
        self.rx.wait_for(|open| *open).await.is_ok()
    }
}

pub type PhaseOutcome<T> = (usize, Result<T, RaceError>);

/// Phase A: writes and flushes `prefix` on every connection concurrently.
/// Returns once every attempt has finished, in completion order.
pub async fn send_prefixes(
    connections: Vec<Connection>,
    prefix: Arc<[u8]>,
) -> Vec<PhaseOutcome<Connection>> {
    let mut tasks = JoinSet::new();
    for mut connection in connections {
        let prefix = Arc::clone(&prefix);
        tasks.spawn(async move {
            let index = connection.index;
            let written = async {
                connection.stream.write_all(&prefix).await?;
                connection.stream.flush().await
            }
            .await;
            match written {
                Ok(()) => {
                    connection.state = ConnectionState::PrefixSent;
                    trace!("Slot {}: prefix of {} bytes sent", index, prefix.len());
                    (index, Ok(connection))
                }
                Err(e) => {
                    connection.state = ConnectionState::Failed;
                    (index, Err(RaceError::PrefixWrite(e)))
                }
            }
        });
    }
    join_outcomes(tasks, "prefix").await
}

/// Phase B: parks one writer per connection on a shared gate, opens it once
/// every writer holds a waiter, and returns when all final bytes are out.
/// Each success carries the instant its write returned.
pub async fn release_final_byte(
    connections: Vec<Connection>,
    last_byte: u8,
) -> Vec<PhaseOutcome<(Connection, Instant)>> {
    let gate = ReleaseGate::new();
    let mut tasks = JoinSet::new();

    for mut connection in connections {
        let waiter = gate.waiter();
        tasks.spawn(async move {
            let index = connection.index;
            if !waiter.wait().await {
                connection.state = ConnectionState::Failed;
                return (
                    index,
                    Err(RaceError::TaskAborted("release gate dropped".to_string())),
                );
            }
            let written = async {
                connection.stream.write_all(&[last_byte]).await?;
                connection.stream.flush().await
            }
            .await;
            let sent_at = Instant::now();
            match written {
                Ok(()) => (index, Ok((connection, sent_at))),
                Err(e) => {
                    connection.state = ConnectionState::Failed;
                    (index, Err(RaceError::FinalWrite(e)))
                }
            }
        });
    }

    debug!("Opening release gate for {} connections", gate.waiters());
    gate.open();
    join_outcomes(tasks, "release").await
}

async fn join_outcomes<T: 'static>(
    mut tasks: JoinSet<PhaseOutcome<T>>,
    phase: &str,
) -> Vec<PhaseOutcome<T>> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => debug!("{} task failed: {}", phase, e),
        }
    }
    outcomes
}
