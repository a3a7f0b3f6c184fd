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

//! Configuration of a single run

use std::path::PathBuf;
use std::time::Duration;

/// Upper bound of the settle delay after installing the policy
pub const MAX_SETTLE: Duration = Duration::from_secs(30);

/// What happens after the transcript is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Tear down the network and exit
    Batch,
    /// Keep the network alive until the operator confirms
    Interactive,
}

/// How the policy is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Submit all rules through the platform
    Automatic,
    /// Write the commands to the transcript, and let the operator apply them
    Manual,
}

/// Configuration of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Batch or interactive
    pub mode: RunMode,
    /// Automatic or manual installation
    pub install: InstallMode,
    /// Delay between installing the policy and the second probe pass. Capped at [`MAX_SETTLE`].
    pub settle: Duration,
    /// Number of echo requests per probe
    pub probe_count: u32,
    /// Time to wait for a single echo reply
    pub probe_timeout: Duration,
    /// Timeout for every other command and control plane call
    pub command_timeout: Duration,
    /// Execute the probes of one pass in parallel
    pub parallel_probes: bool,
    /// Write the transcript to this file
    pub transcript_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Batch,
            install: InstallMode::Automatic,
            settle: Duration::from_secs(2),
            probe_count: 1,
            probe_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(10),
            parallel_probes: false,
            transcript_path: None,
        }
    }
}

impl RunConfig {
    /// Settle delay, capped at [`MAX_SETTLE`]
    pub fn settle_delay(&self) -> Duration {
        self.settle.min(MAX_SETTLE)
    }
}
