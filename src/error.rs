// File: error.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::io;
use thiserror::Error;

/// Errors raised while running a race.
///
/// Only [`RaceError::AllDialsFailed`], [`RaceError::InvalidTarget`],
/// [`RaceError::EmptyRequest`] and [`RaceError::TlsConfig`] leave the engine.
/// Every other variant describes a single slot and ends up as the `error`
/// text of that slot's record.
#[derive(Debug, Error)]
pub enum RaceError {
    #[error("connection failed: {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS server name: {0}")]
    ServerName(String),

    #[error("server negotiated {0} instead of http/1.1")]
    AlpnMismatch(String),

    #[error("prefix write failed: {0}")]
    PrefixWrite(#[source] io::Error),

    #[error("final byte write failed: {0}")]
    FinalWrite(#[source] io::Error),

    #[error("read error: reading status line: {0}")]
    StatusLine(#[source] io::Error),

    #[error("{stage} timed out")]
    Timeout { stage: &'static str },

    #[error("slot task aborted: {0}")]
    TaskAborted(String),

    #[error("all {count} connections failed: {first}")]
    AllDialsFailed {
        count: usize,
        #[source]
        first: Box<RaceError>,
    },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("raw HTTP request is empty")]
    EmptyRequest,

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] rustls::Error),
}

impl RaceError {
    /// True when the error only concerns one connection slot.
    pub fn is_slot_error(&self) -> bool {
        !matches!(
            self,
            Self::AllDialsFailed { .. }
                | Self::InvalidTarget(_)
                | Self::EmptyRequest
                | Self::TlsConfig(_)
        )
    }
}

pub type EngineResult<T> = Result<T, RaceError>;
