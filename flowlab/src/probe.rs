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

//! Connectivity probes

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Probe from a node towards an address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProbePair {
    /// Name of the node that sends the probe
    pub source: String,
    /// Destination address
    pub destination: Ipv4Addr,
}

impl ProbePair {
    /// Create a new probe pair
    pub fn new(source: impl Into<String>, destination: Ipv4Addr) -> Self {
        Self { source: source.into(), destination }
    }
}

impl fmt::Display for ProbePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Phase of the run in which a probe is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePhase {
    /// Before any policy is installed
    Baseline,
    /// After the policy is installed and the network had time to settle
    PostPolicy,
}

impl ProbePhase {
    /// Label used in section titles
    pub fn label(&self) -> &'static str {
        match self {
            Self::Baseline => "before",
            Self::PostPolicy => "after",
        }
    }
}

/// Result of a single probe. The raw output is kept exactly as the probe printed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    /// Name of the node that sent the probe
    pub source: String,
    /// Destination address
    pub destination: Ipv4Addr,
    /// Raw output of the probe
    pub output: String,
    /// The probe reported success through its exit status
    pub success: bool,
    /// The probe did not finish in time
    pub timed_out: bool,
}

impl ProbeResult {
    /// The pair this result belongs to
    pub fn pair(&self) -> ProbePair {
        ProbePair::new(self.source.clone(), self.destination)
    }

    /// Section title for a transcript
    pub fn title(&self, phase: ProbePhase) -> String {
        format!("Ping {} -> {} ({})", self.source, self.destination, phase.label())
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {}",
            self.source,
            self.destination,
            match (self.success, self.timed_out) {
                (true, _) => "reachable",
                (false, true) => "timed out",
                (false, false) => "unreachable",
            }
        )
    }
}
