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

//! # Emulation Platform Boundary
//!
//! Everything the runtime needs from the emulation platform: materializing a topology, executing
//! commands on nodes, and talking to the control plane of the switches. Every call carries a
//! timeout.

use flowlab::Topology;

use log::*;
use std::time::Duration;
use thiserror::Error;

/// Error of the emulation platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Error of the namespace emulator
    #[error("Emulator Error: {0}")]
    Emulator(#[from] netemu::Error),
    /// The node is not part of the materialized network
    #[error("Unknown node: {0}")]
    UnknownNode(String),
    /// The node has no control plane
    #[error("{0} has no control plane")]
    NoControlPlane(String),
    /// The call did not finish in time
    #[error("{what} did not finish within {timeout:?}")]
    Timeout {
        /// Description of the call
        what: String,
        /// Timeout that was exceeded
        timeout: Duration,
    },
    /// The topology cannot be materialized
    #[error("Cannot materialize the network: {0}")]
    Materialize(String),
}

impl PlatformError {
    /// Returns true if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Emulator(netemu::Error::Timeout { .. }))
    }
}

/// Output of a command executed on a node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    /// Everything written to stdout
    pub stdout: String,
    /// Everything written to stderr
    pub stderr: String,
    /// Exit status, `None` if the command was killed
    pub status: Option<i32>,
    /// The command was killed after reaching the timeout
    pub timed_out: bool,
}

impl ExecOutput {
    /// Returns true if the command exited with status 0
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// Both output streams, stdout first
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

impl From<netemu::CommandOutput> for ExecOutput {
    fn from(out: netemu::CommandOutput) -> Self {
        Self {
            stdout: out.stdout,
            stderr: out.stderr,
            status: out.status,
            timed_out: out.timed_out,
        }
    }
}

/// Read-only query to the control plane of a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlQuery {
    /// Report of all ports (`ovs-ofctl show`)
    Show,
    /// Dump of the installed rules (`ovs-ofctl dump-flows`)
    DumpRules,
}

/// Answer of the control plane to a rule submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// The rule was accepted
    pub accepted: bool,
    /// Raw answer of the control plane
    pub detail: String,
}

/// Handle to a materialized network. The handle is shared between threads when probes run in
/// parallel.
pub trait NetworkHandle: Sync {
    /// Execute a shell command on a node. A non-zero exit status is not an error.
    fn exec(&self, node: &str, cmd: &str, timeout: Duration) -> Result<ExecOutput, PlatformError>;

    /// Query the control plane of a switch. Returns the raw report.
    fn query(
        &self,
        device: &str,
        query: ControlQuery,
        timeout: Duration,
    ) -> Result<String, PlatformError>;

    /// Submit a rule specification to the control plane of a switch.
    fn mutate(&self, device: &str, rule: &str, timeout: Duration)
        -> Result<Mutation, PlatformError>;
}

/// Emulation platform, able to materialize a topology and to tear it down again.
pub trait EmulationPlatform {
    /// Handle to the materialized network
    type Handle: NetworkHandle;

    /// Materialize the topology. If this fails, everything created so far must already be removed.
    fn materialize(&mut self, topology: &Topology) -> Result<Self::Handle, PlatformError>;

    /// Remove the materialized network.
    fn teardown(&mut self, handle: Self::Handle) -> Result<(), PlatformError>;
}

/// # Live Network
///
/// Scope guard of a materialized network. The network is torn down either explicitly with
/// [`LiveNetwork::release`], or when the guard is dropped. This also happens on early returns and
/// panics.
pub struct LiveNetwork<'a, P: EmulationPlatform> {
    platform: &'a mut P,
    handle: Option<P::Handle>,
}

impl<'a, P: EmulationPlatform> LiveNetwork<'a, P> {
    /// Materialize the topology on the platform.
    pub fn materialize(platform: &'a mut P, topology: &Topology) -> Result<Self, PlatformError> {
        let handle = platform.materialize(topology)?;
        Ok(Self { platform, handle: Some(handle) })
    }

    /// Get the handle of the network
    pub fn handle(&self) -> &P::Handle {
        // only `release` and `drop` take the handle
        self.handle.as_ref().expect("LiveNetwork used after release")
    }

    /// Tear down the network and report the result.
    pub fn release(mut self) -> Result<(), PlatformError> {
        match self.handle.take() {
            Some(handle) => self.platform.teardown(handle),
            None => Ok(()),
        }
    }
}

impl<'a, P: EmulationPlatform> std::fmt::Debug for LiveNetwork<'a, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveNetwork").field("live", &self.handle.is_some()).finish()
    }
}

impl<'a, P: EmulationPlatform> Drop for LiveNetwork<'a, P> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("Tearing down the network after an early exit");
            if let Err(e) = self.platform.teardown(handle) {
                error!("Cannot tear down the network: {}", e);
            }
        }
    }
}
