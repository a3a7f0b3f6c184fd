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

//! # Topology
//!
//! Logical description of the network: nodes, their interfaces and the links between them. The
//! topology is only a description. It is materialized by an emulation platform in
//! `flowlab_runtime`.
//!
//! ## Interface Naming Convention
//!
//! If no interface name is given when adding a link, the name is chosen as `<node>-eth<k>`, where
//! `k` is the number of interfaces already present on the node. For switches, `k` starts at 1
//! instead of 0, such that `k` matches the port number the switch is expected to assign.

use crate::{ConfigError, Ipv4Cidr};

use itertools::Itertools;
use log::*;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Interface names are limited by the kernel to 15 bytes.
pub const MAX_IFACE_NAME_LEN: usize = 15;

/// Node identification (and index into the graph)
pub type NodeId = NodeIndex<u32>;
/// Link identification (and index into the graph)
pub type LinkId = EdgeIndex<u32>;

/// Role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// End host, does not forward traffic
    Host,
    /// Router, forwards traffic based on its routing table
    Router,
    /// Switch, forwards traffic based on its flow table, programmed through the control plane
    Switch,
}

impl NodeRole {
    /// Returns true if the node moves traffic between its interfaces.
    pub fn is_forwarding_device(&self) -> bool {
        !matches!(self, Self::Host)
    }

    /// Returns true if the node has a control plane which reports its ports and accepts flow rules.
    pub fn has_control_plane(&self) -> bool {
        matches!(self, Self::Switch)
    }

    /// Returns true if the node has a routing table.
    pub fn has_routing_table(&self) -> bool {
        !self.has_control_plane()
    }

    fn first_iface_index(&self) -> usize {
        match self {
            Self::Switch => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Router => write!(f, "router"),
            Self::Switch => write!(f, "switch"),
        }
    }
}

/// One end of a link, given by the node and its interface name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Node of the endpoint
    pub node: NodeId,
    /// Interface name on that node
    pub iface: String,
}

/// Interface of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Logical name of the interface
    pub name: String,
    /// Address of the interface, always `None` on switches
    pub addr: Option<Ipv4Cidr>,
    /// Interface on the other end of the link
    pub peer: Endpoint,
}

/// Node of the topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    role: NodeRole,
    address_plan: Option<Ipv4Cidr>,
    default_route: Option<Ipv4Addr>,
    interfaces: Vec<Interface>,
    sealed: bool,
}

impl Node {
    /// Name of the node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role of the node
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// All interfaces of the node, in the order in which their links were declared
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Get the interface with the given name
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Address plan of the node, used for its first interface if that one has no explicit address.
    pub fn address_plan(&self) -> Option<Ipv4Cidr> {
        self.address_plan
    }

    /// Primary address of the node: the first address of any interface, or the address plan.
    pub fn primary_address(&self) -> Option<Ipv4Cidr> {
        self.interfaces.iter().filter_map(|i| i.addr).next().or(self.address_plan)
    }

    /// Default route that is configured when the network is materialized.
    pub fn default_route(&self) -> Option<Ipv4Addr> {
        self.default_route
    }

    /// Returns true if no more interfaces can be added
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn next_iface_name(&self) -> String {
        let mut k = self.role.first_iface_index() + self.interfaces.len();
        loop {
            let name = format!("{}-eth{}", self.name, k);
            if self.interface(&name).is_none() {
                return name;
            }
            k += 1;
        }
    }
}

/// Emulated link characteristics, passed on to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkParams {
    /// Bandwidth limit in Mbit/s
    #[serde(default)]
    pub bandwidth_mbit: Option<u32>,
    /// One-way delay in milliseconds
    #[serde(default)]
    pub delay_ms: Option<u32>,
}

impl fmt::Display for LinkParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bw = self.bandwidth_mbit.map(|x| format!("bw {} Mbit/s", x));
        let delay = self.delay_ms.map(|x| format!("delay {} ms", x));
        write!(f, "{}", bw.into_iter().chain(delay).join(", "))
    }
}

/// Link between two interfaces. Links are never changed after creation, except for their
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// First endpoint
    pub a: Endpoint,
    /// Second endpoint
    pub b: Endpoint,
    /// Emulated characteristics
    pub params: LinkParams,
}

/// Description of a link end, used in [`Topology::add_link`].
///
/// ```
/// # use flowlab::{LinkEnd, NodeRole, Topology};
/// let mut t = Topology::new();
/// let h1 = t.add_node("h1", NodeRole::Host, None).unwrap();
/// let r1 = t.add_node("r1", NodeRole::Router, None).unwrap();
/// t.add_link(
///     LinkEnd::new(h1).addr("10.0.0.1/24".parse().unwrap()),
///     LinkEnd::new(r1).iface("r1-eth0").addr("10.0.0.3/24".parse().unwrap()),
/// ).unwrap();
/// assert_eq!(t.declared_interfaces("h1"), vec!["h1-eth0"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEnd {
    node: NodeId,
    iface: Option<String>,
    addr: Option<Ipv4Cidr>,
}

impl LinkEnd {
    /// Link end at the given node, with the default interface name and no address.
    pub fn new(node: NodeId) -> Self {
        Self { node, iface: None, addr: None }
    }

    /// Use an explicit interface name
    pub fn iface(mut self, name: impl Into<String>) -> Self {
        self.iface = Some(name.into());
        self
    }

    /// Assign an address to the interface
    pub fn addr(mut self, addr: Ipv4Cidr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Use an optional interface name and an optional address
    pub fn with(mut self, iface: Option<String>, addr: Option<Ipv4Cidr>) -> Self {
        self.iface = iface;
        self.addr = addr;
        self
    }
}

/// # Topology
///
/// Undirected graph of nodes and links. Node names are unique, and interface names are unique
/// within each node.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: UnGraph<Node, Link>,
    names: HashMap<String, NodeId>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new node. The address plan is used for the first interface of the node, if that
    /// interface is not given an explicit address.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        role: NodeRole,
        address_plan: Option<Ipv4Cidr>,
    ) -> Result<NodeId, ConfigError> {
        let name = name.into();
        if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == ':') {
            return Err(ConfigError::InvalidNodeName(name));
        }
        if self.names.contains_key(&name) {
            return Err(ConfigError::DuplicateNode(name));
        }
        if role == NodeRole::Switch && address_plan.is_some() {
            return Err(ConfigError::AddressOnSwitch(name));
        }
        let id = self.graph.add_node(Node {
            name: name.clone(),
            role,
            address_plan,
            default_route: None,
            interfaces: Vec::new(),
            sealed: false,
        });
        debug!("added {} {}", role, name);
        self.names.insert(name, id);
        Ok(id)
    }

    /// Add a link between two nodes. For every end, a new interface is created on the node.
    ///
    /// The following errors may occur:
    /// - `UnknownNode` if one of the nodes does not exist
    /// - `SelfLoop` if both ends are on the same node
    /// - `NodeSealed` if the interface set of one of the nodes is already sealed
    /// - `DuplicateInterface` if the interface name is already used on that node
    /// - `AddressOnSwitch` if an address is assigned to a switch port
    /// - `SubnetMismatch` if both ends have an address, but in different networks
    pub fn add_link(&mut self, a: LinkEnd, b: LinkEnd) -> Result<LinkId, ConfigError> {
        for end in &[&a, &b] {
            match self.graph.node_weight(end.node) {
                None => return Err(ConfigError::UnknownNode(format!("#{}", end.node.index()))),
                Some(n) if n.sealed => return Err(ConfigError::NodeSealed(n.name.clone())),
                Some(_) => {}
            }
        }
        if a.node == b.node {
            return Err(ConfigError::SelfLoop(self.graph[a.node].name.clone()));
        }

        let (name_a, addr_a) = self.prepare_end(&a)?;
        let (name_b, addr_b) = self.prepare_end(&b)?;
        if let (Some(x), Some(y)) = (addr_a, addr_b) {
            if !x.same_network(&y) {
                return Err(ConfigError::SubnetMismatch(x.to_string(), y.to_string()));
            }
        }

        let end_a = Endpoint { node: a.node, iface: name_a };
        let end_b = Endpoint { node: b.node, iface: name_b };
        self.graph[a.node].interfaces.push(Interface {
            name: end_a.iface.clone(),
            addr: addr_a,
            peer: end_b.clone(),
        });
        self.graph[b.node].interfaces.push(Interface {
            name: end_b.iface.clone(),
            addr: addr_b,
            peer: end_a.clone(),
        });
        debug!(
            "added link {}:{} <-> {}:{}",
            self.graph[a.node].name, end_a.iface, self.graph[b.node].name, end_b.iface
        );
        Ok(self.graph.add_edge(
            a.node,
            b.node,
            Link { a: end_a, b: end_b, params: LinkParams::default() },
        ))
    }

    /// Set the emulated characteristics of a link
    pub fn set_link_params(&mut self, link: LinkId, params: LinkParams) -> Result<(), ConfigError> {
        match self.graph.edge_weight_mut(link) {
            Some(l) => {
                l.params = params;
                Ok(())
            }
            None => Err(ConfigError::UnknownLink(link.index())),
        }
    }

    /// Set the default route of a host or a router, configured when the network is materialized.
    pub fn set_default_route(&mut self, node: NodeId, via: Ipv4Addr) -> Result<(), ConfigError> {
        match self.graph.node_weight_mut(node) {
            Some(n) if n.role.has_routing_table() => {
                n.default_route = Some(via);
                Ok(())
            }
            Some(n) => Err(ConfigError::RouteOnSwitch(n.name.clone())),
            None => Err(ConfigError::UnknownNode(format!("#{}", node.index()))),
        }
    }

    /// Seal all nodes. Afterwards, no more links can be added.
    pub fn seal(&mut self) {
        let ids: Vec<NodeId> = self.graph.node_indices().collect();
        for id in ids {
            self.graph[id].sealed = true;
        }
    }

    /// Check that all addresses within the same broadcast domain share the same network. A
    /// broadcast domain consists of all switches which are connected to each other, together
    /// with all interfaces attached to them. Direct links are already checked in
    /// [`Topology::add_link`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut domains = UnionFind::new(self.graph.node_count());
        for link in self.links() {
            if self.role_of(link.a.node) == NodeRole::Switch
                && self.role_of(link.b.node) == NodeRole::Switch
            {
                domains.union(link.a.node.index(), link.b.node.index());
            }
        }

        let mut seen: HashMap<usize, (String, Ipv4Cidr)> = HashMap::new();
        for link in self.links() {
            for &(switch, other) in &[(&link.a, &link.b), (&link.b, &link.a)] {
                if self.role_of(switch.node) != NodeRole::Switch
                    || self.role_of(other.node) == NodeRole::Switch
                {
                    continue;
                }
                let addr = match self.interface_addr(other) {
                    Some(addr) => addr,
                    None => continue,
                };
                let label = format!("{}:{} ({})", self.graph[other.node].name, other.iface, addr);
                let domain = domains.find(switch.node.index());
                match seen.get(&domain) {
                    Some((first, first_addr)) if !first_addr.same_network(&addr) => {
                        return Err(ConfigError::BroadcastDomainMismatch(first.clone(), label));
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(domain, (label, addr));
                    }
                }
            }
        }
        Ok(())
    }

    /// Get the node id from its name
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Get the node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id)
    }

    /// Get the node by its name
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.node_id(name).and_then(|id| self.node(id))
    }

    /// Iterate over all nodes, in the order in which they were added
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.graph.node_indices().map(move |id| &self.graph[id])
    }

    /// Iterate over all links, in the order in which they were added
    pub fn links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.graph.raw_edges().iter().map(|e| &e.weight)
    }

    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of links
    pub fn num_links(&self) -> usize {
        self.graph.edge_count()
    }

    /// Name of the node of an endpoint
    pub fn endpoint_node_name(&self, end: &Endpoint) -> &str {
        self.graph.node_weight(end.node).map(|n| n.name.as_str()).unwrap_or("?")
    }

    /// Interface names of a node, in the order in which the links were declared. Returns an empty
    /// vector for unknown nodes.
    pub fn declared_interfaces(&self, node: &str) -> Vec<String> {
        self.node_by_name(node)
            .map(|n| n.interfaces.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Names of all nodes with a control plane (switches), in the order in which they were added.
    pub fn control_plane_devices(&self) -> Vec<String> {
        self.nodes().filter(|n| n.role.has_control_plane()).map(|n| n.name.clone()).collect()
    }

    /// Human-readable description of all nodes and links
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for node in self.nodes() {
            lines.push(format!("{} ({})", node.name, node.role));
            for iface in node.interfaces.iter() {
                let addr = iface.addr.map(|a| format!(" {}", a)).unwrap_or_default();
                lines.push(format!(
                    "    {}{} <-> {}:{}",
                    iface.name,
                    addr,
                    self.endpoint_node_name(&iface.peer),
                    iface.peer.iface
                ));
            }
            if let Some(via) = node.default_route {
                lines.push(format!("    default via {}", via));
            }
        }
        lines.push("Links:".to_string());
        for link in self.links() {
            let params = link.params.to_string();
            lines.push(format!(
                "    {}:{} <-> {}:{}{}",
                self.endpoint_node_name(&link.a),
                link.a.iface,
                self.endpoint_node_name(&link.b),
                link.b.iface,
                if params.is_empty() { String::new() } else { format!(" ({})", params) }
            ));
        }
        lines.join("\n")
    }

    fn role_of(&self, node: NodeId) -> NodeRole {
        self.graph[node].role
    }

    fn interface_addr(&self, end: &Endpoint) -> Option<Ipv4Cidr> {
        self.graph[end.node].interface(&end.iface).and_then(|i| i.addr)
    }

    fn prepare_end(&self, end: &LinkEnd) -> Result<(String, Option<Ipv4Cidr>), ConfigError> {
        let node = &self.graph[end.node];
        let name = match end.iface.as_ref() {
            Some(name) => name.clone(),
            None => node.next_iface_name(),
        };
        if name.is_empty()
            || name.len() > MAX_IFACE_NAME_LEN
            || name.contains(|c: char| c.is_whitespace() || c == '/')
        {
            return Err(ConfigError::InvalidInterfaceName { node: node.name.clone(), iface: name });
        }
        if node.interface(&name).is_some() {
            return Err(ConfigError::DuplicateInterface { node: node.name.clone(), iface: name });
        }
        let addr = match end.addr {
            Some(_) if node.role == NodeRole::Switch => {
                return Err(ConfigError::AddressOnSwitch(node.name.clone()))
            }
            Some(addr) => Some(addr),
            None if node.interfaces.is_empty() => node.address_plan,
            None => None,
        };
        Ok((name, addr))
    }
}
