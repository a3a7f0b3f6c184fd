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

//! Module containing all error types

use crate::topology::NodeRole;
use thiserror::Error;

/// Configuration error. It is raised while building the topology or reading a scenario, before
/// anything is created on the emulation platform.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The address cannot be parsed as `x.x.x.x/len`
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// A node with the same name already exists
    #[error("Node {0} already exists")]
    DuplicateNode(String),
    /// The node name is not valid
    #[error("Invalid node name: {0:?}")]
    InvalidNodeName(String),
    /// The node does not exist
    #[error("Unknown node: {0}")]
    UnknownNode(String),
    /// The link does not exist
    #[error("Unknown link: {0}")]
    UnknownLink(usize),
    /// The interface name is already used on this node
    #[error("Interface {iface} already exists on {node}")]
    DuplicateInterface {
        /// Node name
        node: String,
        /// Interface name
        iface: String,
    },
    /// The interface name is not valid
    #[error("Invalid interface name on {node}: {iface:?}")]
    InvalidInterfaceName {
        /// Node name
        node: String,
        /// Interface name
        iface: String,
    },
    /// Switch ports and switches cannot carry an address
    #[error("Switch {0} cannot carry an address")]
    AddressOnSwitch(String),
    /// Switches have no routing table
    #[error("Switch {0} cannot have a default route")]
    RouteOnSwitch(String),
    /// Both ends of a link must be in the same network
    #[error("Addresses {0} and {1} of the same link are not in the same network")]
    SubnetMismatch(String, String),
    /// All addresses of a broadcast domain must be in the same network
    #[error("Broadcast domain mixes the networks of {0} and {1}")]
    BroadcastDomainMismatch(String, String),
    /// A node cannot be linked to itself
    #[error("Cannot link {0} to itself")]
    SelfLoop(String),
    /// The interface set of the node is sealed
    #[error("Node {0} is sealed, cannot add more interfaces")]
    NodeSealed(String),
    /// A node used as probe destination has no address
    #[error("Node {0} has no address")]
    NoAddress(String),
    /// The same probe is declared twice
    #[error("Probe {0} is declared twice")]
    DuplicateProbe(String),
    /// The scenario file cannot be parsed
    #[error("Invalid scenario: {0}")]
    InvalidScenario(#[from] serde_json::Error),
    /// The scenario file cannot be read
    #[error("Cannot read the scenario: {0}")]
    Io(#[from] std::io::Error),
}

/// Reason why a single rule cannot be rendered for a device. This error only affects the rule
/// itself, all other rules are still installed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    /// The interface is not part of the port mapping of the device
    #[error("interface {0} is not part of the port mapping")]
    UnknownInterface(String),
    /// Flow rules need a port mapping, which is only available for switches
    #[error("flow rules cannot be installed on a {0}")]
    FlowOnRoutingDevice(NodeRole),
    /// Routes need a routing table, which switches don't have
    #[error("routes cannot be installed on a {0}")]
    RouteOnSwitch(NodeRole),
    /// Routes cannot match on the input interface
    #[error("routes cannot match on the input interface")]
    MatchOnRoute,
    /// The port mapping of the device is missing
    #[error("no port mapping available")]
    NoPortMapping,
}
