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

//! # Scenario
//!
//! Declarative description of an experiment: the topology, the forwarding policy of every device,
//! and the probes to execute before and after installing the policy. Scenarios can be read from
//! JSON files:
//!
//! ```json
//! {
//!   "name": "two hosts",
//!   "nodes": [
//!     { "name": "h1", "role": "host", "address": "10.0.0.1/24" },
//!     { "name": "h2", "role": "host", "address": "10.0.0.2/24" },
//!     { "name": "s1", "role": "switch" }
//!   ],
//!   "links": [
//!     { "a": { "node": "h1" }, "b": { "node": "s1" } },
//!     { "a": { "node": "h2" }, "b": { "node": "s1" }, "params": { "delay_ms": 5 } }
//!   ],
//!   "policy": [
//!     { "device": "s1", "rules": [
//!       { "priority": 100, "match": { "type": "in_port", "iface": "s1-eth2" },
//!         "action": { "type": "drop" } }
//!     ] }
//!   ],
//!   "probes": [ { "source": "h1", "destination": "h2" } ]
//! }
//! ```

use crate::policy::DevicePolicy;
use crate::probe::ProbePair;
use crate::topology::{LinkEnd, LinkParams, NodeRole, Topology};
use crate::{ConfigError, Ipv4Cidr};

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

/// Description of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node name
    pub name: String,
    /// Role of the node
    pub role: NodeRole,
    /// Address plan, used for the first interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Cidr>,
    /// Default route, configured when the network is materialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_route: Option<Ipv4Addr>,
}

impl NodeSpec {
    /// Create a new node description
    pub fn new(name: impl Into<String>, role: NodeRole, address: Option<Ipv4Cidr>) -> Self {
        Self { name: name.into(), role, address, default_route: None }
    }
}

/// Description of a link end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndSpec {
    /// Node name
    pub node: String,
    /// Interface name, chosen by convention if missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
    /// Address of the interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<Ipv4Cidr>,
}

impl EndSpec {
    /// Link end at the node, with the default interface name and no explicit address.
    pub fn node(node: impl Into<String>) -> Self {
        Self { node: node.into(), iface: None, addr: None }
    }

    /// Link end with an explicit interface name and an address
    pub fn addressed(node: impl Into<String>, iface: impl Into<String>, addr: Ipv4Cidr) -> Self {
        Self { node: node.into(), iface: Some(iface.into()), addr: Some(addr) }
    }
}

/// Description of a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// First end
    pub a: EndSpec,
    /// Second end
    pub b: EndSpec,
    /// Emulated characteristics
    #[serde(default)]
    pub params: LinkParams,
}

impl LinkSpec {
    /// Create a new link description without emulated characteristics
    pub fn new(a: EndSpec, b: EndSpec) -> Self {
        Self { a, b, params: LinkParams::default() }
    }
}

/// Description of a probe. The destination is either an address or the name of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Node that sends the probe
    pub source: String,
    /// Destination address or node name
    pub destination: String,
}

impl ProbeSpec {
    /// Create a new probe description
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self { source: source.into(), destination: destination.into() }
    }
}

/// # Scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Name of the scenario, used as the transcript title
    pub name: String,
    /// Nodes, in declaration order
    pub nodes: Vec<NodeSpec>,
    /// Links, in declaration order
    pub links: Vec<LinkSpec>,
    /// Forwarding policy per device
    #[serde(default)]
    pub policy: Vec<DevicePolicy>,
    /// Probes, executed before and after installing the policy
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,
}

/// Scenario, checked and turned into a topology
#[derive(Debug, Clone)]
pub struct Experiment {
    /// Name of the scenario
    pub name: String,
    /// The sealed and validated topology
    pub topology: Topology,
    /// Forwarding policy per device
    pub policies: Vec<DevicePolicy>,
    /// Probes, with resolved destinations
    pub probes: Vec<ProbePair>,
}

impl Experiment {
    /// Returns true if any rule is declared
    pub fn has_policy(&self) -> bool {
        self.policies.iter().any(|p| !p.rules.is_empty())
    }
}

impl Scenario {
    /// Read a scenario from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a scenario from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Write the scenario as pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the topology and check the scenario. Every error found here is a configuration
    /// error, which must abort the run before anything is materialized.
    ///
    /// Rules are not checked against the interfaces of their device. A rule referencing an
    /// unknown interface only fails on its own during installation.
    pub fn build(&self) -> Result<Experiment, ConfigError> {
        let mut topology = Topology::new();
        for node in self.nodes.iter() {
            let id = topology.add_node(node.name.clone(), node.role, node.address)?;
            if let Some(via) = node.default_route {
                topology.set_default_route(id, via)?;
            }
        }

        for link in self.links.iter() {
            let a = link_end(&topology, &link.a)?;
            let b = link_end(&topology, &link.b)?;
            let id = topology.add_link(a, b)?;
            topology.set_link_params(id, link.params)?;
        }
        topology.seal();
        topology.validate()?;

        // several entries of the same device are merged, keeping the declaration order
        let mut policies: Vec<DevicePolicy> = Vec::new();
        for policy in self.policy.iter() {
            if topology.node_id(&policy.device).is_none() {
                return Err(ConfigError::UnknownNode(policy.device.clone()));
            }
            match policies.iter_mut().find(|p| p.device == policy.device) {
                Some(merged) => merged.rules.extend(policy.rules.iter().cloned()),
                None => policies.push(policy.clone()),
            }
        }

        let mut probes: Vec<ProbePair> = Vec::with_capacity(self.probes.len());
        for p in self.probes.iter() {
            if topology.node_id(&p.source).is_none() {
                return Err(ConfigError::UnknownNode(p.source.clone()));
            }
            let destination = resolve_destination(&topology, &p.destination)?;
            let pair = ProbePair::new(p.source.clone(), destination);
            if probes.contains(&pair) {
                return Err(ConfigError::DuplicateProbe(pair.to_string()));
            }
            probes.push(pair);
        }

        Ok(Experiment { name: self.name.clone(), topology, policies, probes })
    }
}

fn link_end(topology: &Topology, end: &EndSpec) -> Result<LinkEnd, ConfigError> {
    let id =
        topology.node_id(&end.node).ok_or_else(|| ConfigError::UnknownNode(end.node.clone()))?;
    Ok(LinkEnd::new(id).with(end.iface.clone(), end.addr))
}

fn resolve_destination(topology: &Topology, destination: &str) -> Result<Ipv4Addr, ConfigError> {
    if let Ok(addr) = destination.parse::<Ipv4Addr>() {
        return Ok(addr);
    }
    let node = topology
        .node_by_name(destination)
        .ok_or_else(|| ConfigError::UnknownNode(destination.to_string()))?;
    node.primary_address()
        .map(|a| a.addr())
        .ok_or_else(|| ConfigError::NoAddress(destination.to_string()))
}
