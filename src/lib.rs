// File: lib.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_inception)]
#![allow(clippy::bool_assert_comparison)]
#![allow(clippy::new_without_default)]
#![allow(clippy::useless_vec)]

pub mod aggregate;
pub mod barrier;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod race;
pub mod race_cli;
pub mod reports;
pub mod request;
pub mod response;
pub mod state;
pub mod target;


pub use aggregate::{RaceResult, ResponseRecord};
pub use config::RaceConfig;
pub use error::{EngineResult, RaceError};
pub use race::RaceEngine;
pub use request::prepare_request;
pub use target::RaceTarget;
