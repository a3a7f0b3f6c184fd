// FlowLab: Provisioning and Verifying Emulated Networks
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Runtime System
//!
//! This crate materializes a [`flowlab`] scenario on an emulation platform, installs its
//! forwarding policy and records how the network behaves before and after. For simplified usage,
//! check the function [`run_scenario`].
//!
//! ## Structure
//!
//! - **[`platform`]**: The boundary to the emulation platform, and the [`LiveNetwork`] guard
//!   which tears the network down on every exit path.
//! - **[`namespace_platform`]**: Network namespaces and Open vSwitch bridges on the local machine,
//!   built with [`netemu`].
//! - **[`sim_platform`]**: In-process simulated network, answering the same commands.
//! - **[`resolver`]**, **[`installer`]** and **[`harness`]**: Port resolution, policy installation
//!   and connectivity probes.
//! - **[`orchestrator`]**: The sequence of a complete run.

#![deny(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod harness;
pub mod installer;
pub mod namespace_platform;
pub mod orchestrator;
pub mod platform;
pub mod report;
pub mod resolver;
pub mod sim_platform;

pub use config::{InstallMode, RunConfig, RunMode};
pub use namespace_platform::NamespacePlatform;
pub use orchestrator::{NoOperator, Operator, Orchestrator};
pub use platform::{EmulationPlatform, LiveNetwork, NetworkHandle, PlatformError};
pub use report::RunReport;
pub use sim_platform::{SimOptions, SimPlatform};

use flowlab::{ConfigError, Scenario};
use thiserror::Error;

/// Error of a run. Everything else (failed rules, failed probes, degraded port mappings) is
/// recorded in the [`RunReport`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The scenario is invalid. Nothing was created on the platform.
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    /// The platform failed to materialize or tear down the network
    #[error("Platform Error: {0}")]
    Platform(#[from] PlatformError),
}

/// # Run a scenario
///
/// Run the scenario in batch mode on the given platform, with automatic installation of the
/// policy. See [`Orchestrator::run`] for the individual steps.
pub fn run_scenario<P: EmulationPlatform>(
    platform: P,
    scenario: &Scenario,
    config: RunConfig,
) -> Result<RunReport, RuntimeError> {
    Orchestrator::new(platform, config).run(scenario)
}
