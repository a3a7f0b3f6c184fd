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

#![deny(missing_docs)]

//! # FlowLab: Provisioning and Verifying Emulated Networks
//! This is a library for describing small virtual networks, programming their forwarding
//! behavior, and recording whether the network behaves as expected. It contains the model only.
//! Running the network on an emulation platform is done in `flowlab_runtime`.
//!
//! ## Structure
//!
//! - **[`Topology`](topology)**: Graph of hosts, routers and switches, with stable interface
//!   names and address checks. Once the topology is [sealed](topology::Topology::seal), the
//!   interface set of every node is fixed.
//!
//! - **[`Ports`](ports)**: Parsers for the port report of a switch control plane, and the
//!   resolution of logical interface names into runtime port numbers
//!   ([`PortMapping`](ports::PortMapping)). Resolution never fails: if the report cannot be read,
//!   the mapping falls back to the declaration order and is marked as degraded.
//!
//! - **[`Policy`](policy)**: Forwarding rules, either OpenFlow rules for switches or static routes
//!   for hosts and routers. Rules are submitted in the order of descending priority, and each rule
//!   has its own [`RuleStatus`](policy::RuleStatus).
//!
//! - **[`Probes`](probe)**: Connectivity probes and their results.
//!
//! - **[`Transcript`](transcript)**: Ordered, titled sections of a run, written as flat text.
//!
//! - **[`Scenario`](scenario)**: Declarative description of a complete experiment, readable from
//!   JSON. The built-in experiments are in [`example_scenarios`].

pub mod addr;
mod error;
pub mod example_scenarios;
pub mod policy;
pub mod ports;
pub mod probe;
pub mod scenario;
pub mod topology;
pub mod transcript;

pub use addr::Ipv4Cidr;
pub use error::{ConfigError, RuleError};
pub use policy::{DevicePolicy, InstallOutcome, PolicyRule, RuleAction, RuleMatch, RuleStatus};
pub use ports::PortMapping;
pub use probe::{ProbePair, ProbePhase, ProbeResult};
pub use scenario::{Experiment, Scenario};
pub use topology::{LinkEnd, LinkParams, NodeId, NodeRole, Topology};
pub use transcript::Transcript;

#[cfg(test)]
mod test;
