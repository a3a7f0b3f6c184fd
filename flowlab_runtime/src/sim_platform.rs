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

//! # Simulated Platform
//!
//! In-process network that answers the same commands as the namespace platform, with the same
//! output format. Hosts and routers have a routing table with the connected networks, routers
//! forward packets, and switches forward frames according to their OpenFlow table. Every switch
//! starts with the single entry `priority=0 actions=NORMAL`, which floods frames to all other
//! ports.
//!
//! A ping succeeds only if both the request and the reply reach their destination. The simulated
//! network supports the following commands:
//!
//! - on hosts and routers: `ping -c <n> -W <s> <addr>`, `ip route`, `ip route add default via <gw>`
//!   and `ip route add <net> via <gw>`.
//! - on switches (through the control plane): `show`, `dump-flows` and `add-flow`.

use crate::platform::*;
use flowlab::{Ipv4Cidr, NodeRole, Topology};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

lazy_static! {
    static ref PING_RE: Regex =
        Regex::new(r"^ping(?:\s+-c\s*(\d+))?(?:\s+-W\s*(\d+))?\s+(\d+\.\d+\.\d+\.\d+)\s*$")
            .unwrap();
    static ref ROUTE_ADD_RE: Regex =
        Regex::new(r"^ip\s+route\s+add\s+(default|\S+/\d+)\s+via\s+(\d+\.\d+\.\d+\.\d+)\s*$")
            .unwrap();
    static ref ROUTE_SHOW_RE: Regex = Regex::new(r"^ip\s+route(?:\s+show)?\s*$").unwrap();
}

const INITIAL_TTL: u8 = 64;
const BASE_RTT_MS: f64 = 0.05;

/// Layout of the port report of the simulated switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLayout {
    /// Layout of `ovs-ofctl show`: ` 1(s1-eth1): addr:...`
    Inline,
    /// One line per port: `PORT 1: s1-eth1`
    Tabular,
    /// Port numbers and names, but in a format no parser understands
    Garbage,
    /// Empty report
    Empty,
}

/// Behavior of the simulated platform
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Layout of the port reports
    pub layout: ReportLayout,
    /// Added to every port number. Without offset, the `i`-th interface of a switch has port `i`.
    pub port_offset: u32,
    /// Switches whose control plane never answers
    pub unresponsive: Vec<String>,
    /// Switches whose control plane rejects every rule
    pub read_only: Vec<String>,
    /// Materialization always fails
    pub fail_materialize: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            layout: ReportLayout::Inline,
            port_offset: 0,
            unresponsive: Vec::new(),
            read_only: Vec::new(),
            fail_materialize: false,
        }
    }
}

/// # Simulated Platform
///
/// The platform keeps track of how many networks were materialized and torn down.
#[derive(Debug, Clone, Default)]
pub struct SimPlatform {
    options: SimOptions,
    materialized: usize,
    torn_down: usize,
}

impl SimPlatform {
    /// Create a new simulated platform
    pub fn new(options: SimOptions) -> Self {
        Self { options, materialized: 0, torn_down: 0 }
    }

    /// Options of the platform
    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    /// Number of networks materialized so far
    pub fn materialized(&self) -> usize {
        self.materialized
    }

    /// Number of networks torn down so far
    pub fn torn_down(&self) -> usize {
        self.torn_down
    }

    /// Number of networks that are still alive
    pub fn live(&self) -> usize {
        self.materialized - self.torn_down
    }
}

impl EmulationPlatform for SimPlatform {
    type Handle = SimNetwork;

    fn materialize(&mut self, topology: &Topology) -> Result<SimNetwork, PlatformError> {
        if self.options.fail_materialize {
            return Err(PlatformError::Materialize("simulated failure".to_string()));
        }
        let net = SimNetwork::new(topology, &self.options)?;
        self.materialized += 1;
        info!("Simulated network with {} nodes created", net.nodes.len());
        Ok(net)
    }

    fn teardown(&mut self, handle: SimNetwork) -> Result<(), PlatformError> {
        self.torn_down += 1;
        info!("Simulated network with {} nodes removed", handle.nodes.len());
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SimIface {
    name: String,
    addr: Option<Ipv4Cidr>,
    peer: Option<(usize, usize)>,
    delay_ms: u32,
}

#[derive(Debug, Clone)]
struct SimNode {
    name: String,
    role: NodeRole,
    ifaces: Vec<SimIface>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    dest: Ipv4Cidr,
    via: Option<Ipv4Addr>,
    dev: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowAction {
    Drop,
    Output(u32),
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Flow {
    priority: u16,
    in_port: Option<u32>,
    action: FlowAction,
    n_packets: u64,
}

impl Flow {
    fn table_default() -> Self {
        Self { priority: 0, in_port: None, action: FlowAction::Normal, n_packets: 0 }
    }

    fn matches(&self, in_port: u32) -> bool {
        self.in_port.map(|p| p == in_port).unwrap_or(true)
    }
}

#[derive(Debug, Default)]
struct SimState {
    routes: Vec<Vec<Route>>,
    flows: Vec<Vec<Flow>>,
}

enum Forwarding {
    Arrived { node: usize, ttl: u8, delay_ms: u32 },
    NoRoute,
    Lost,
}

/// Network materialized on the [`SimPlatform`].
#[derive(Debug)]
pub struct SimNetwork {
    nodes: Vec<SimNode>,
    index: HashMap<String, usize>,
    port_offset: u32,
    layout: ReportLayout,
    unresponsive: HashSet<String>,
    read_only: HashSet<String>,
    state: Mutex<SimState>,
}

impl SimNetwork {
    fn new(topology: &Topology, options: &SimOptions) -> Result<Self, PlatformError> {
        let mut nodes: Vec<SimNode> = topology
            .nodes()
            .map(|n| SimNode {
                name: n.name().to_string(),
                role: n.role(),
                ifaces: n
                    .interfaces()
                    .iter()
                    .map(|i| SimIface {
                        name: i.name.clone(),
                        addr: i.addr,
                        peer: None,
                        delay_ms: 0,
                    })
                    .collect(),
            })
            .collect();
        let index: HashMap<String, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.name.clone(), i)).collect();

        for link in topology.links() {
            let a = locate(&nodes, &index, topology.endpoint_node_name(&link.a), &link.a.iface)?;
            let b = locate(&nodes, &index, topology.endpoint_node_name(&link.b), &link.b.iface)?;
            let delay_ms = link.params.delay_ms.unwrap_or(0);
            nodes[a.0].ifaces[a.1].peer = Some(b);
            nodes[a.0].ifaces[a.1].delay_ms = delay_ms;
            nodes[b.0].ifaces[b.1].peer = Some(a);
            nodes[b.0].ifaces[b.1].delay_ms = delay_ms;
        }

        let mut state = SimState::default();
        for node in nodes.iter() {
            state.routes.push(
                node.ifaces
                    .iter()
                    .enumerate()
                    .filter_map(|(dev, i)| Some(Route { dest: i.addr?.network(), via: None, dev }))
                    .collect(),
            );
            state.flows.push(if node.role.has_control_plane() {
                vec![Flow::table_default()]
            } else {
                Vec::new()
            });
        }

        let net = Self {
            nodes,
            index,
            port_offset: options.port_offset,
            layout: options.layout,
            unresponsive: options.unresponsive.iter().cloned().collect(),
            read_only: options.read_only.iter().cloned().collect(),
            state: Mutex::new(state),
        };

        for node in topology.nodes() {
            if let Some(via) = node.default_route() {
                let cmd = format!("ip route add default via {}", via);
                let out = net.exec(node.name(), &cmd, Duration::from_secs(1))?;
                if !out.success() {
                    return Err(PlatformError::Materialize(format!(
                        "default route of {}: {}",
                        node.name(),
                        out.stderr.trim()
                    )));
                }
            }
        }

        Ok(net)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn node_idx(&self, name: &str) -> Result<usize, PlatformError> {
        self.index.get(name).copied().ok_or_else(|| PlatformError::UnknownNode(name.to_string()))
    }

    fn switch_idx(&self, name: &str) -> Result<usize, PlatformError> {
        let idx = self.node_idx(name)?;
        if !self.nodes[idx].role.has_control_plane() {
            return Err(PlatformError::NoControlPlane(name.to_string()));
        }
        Ok(idx)
    }

    fn port_number(&self, iface: usize) -> u32 {
        iface as u32 + 1 + self.port_offset
    }

    fn iface_of_port(&self, switch: usize, port: u32) -> Option<usize> {
        let idx = port.checked_sub(1 + self.port_offset)? as usize;
        if idx < self.nodes[switch].ifaces.len() {
            Some(idx)
        } else {
            None
        }
    }

    fn owns(&self, node: usize, addr: Ipv4Addr) -> bool {
        self.nodes[node].ifaces.iter().any(|i| i.addr.map(|a| a.addr()) == Some(addr))
    }

    /// Longest prefix match in the routing table of a node
    fn lookup<'s>(&self, state: &'s SimState, node: usize, dest: Ipv4Addr) -> Option<&'s Route> {
        state.routes[node]
            .iter()
            .filter(|r| r.dest.contains(dest))
            .max_by_key(|r| r.dest.prefix_len())
    }

    /// Send a packet from `start` towards `dest`, hop by hop.
    fn forward(
        &self,
        state: &mut SimState,
        start: usize,
        dest: Ipv4Addr,
        count: u64,
    ) -> Forwarding {
        let mut cur = start;
        let mut ttl = INITIAL_TTL;
        let mut delay_ms = 0;
        loop {
            if self.owns(cur, dest) {
                return Forwarding::Arrived { node: cur, ttl, delay_ms };
            }
            if cur != start {
                if !self.nodes[cur].role.is_forwarding_device() || ttl <= 1 {
                    return Forwarding::Lost;
                }
                ttl -= 1;
            }
            let (dev, next_hop) = match self.lookup(state, cur, dest) {
                Some(route) => (route.dev, route.via.unwrap_or(dest)),
                None if cur == start => return Forwarding::NoRoute,
                None => return Forwarding::Lost,
            };
            match self.deliver_frame(state, cur, dev, next_hop, count) {
                Some((next, d)) => {
                    cur = next;
                    delay_ms += d;
                }
                None => return Forwarding::Lost,
            }
        }
    }

    /// Send a frame out of `iface` of `node`, and return the node owning `target` that receives it.
    fn deliver_frame(
        &self,
        state: &mut SimState,
        node: usize,
        iface: usize,
        target: Ipv4Addr,
        count: u64,
    ) -> Option<(usize, u32)> {
        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();
        queue.push_back((node, iface, 0));
        while let Some((n, i, d)) = queue.pop_front() {
            let (peer, peer_iface) = match self.nodes[n].ifaces[i].peer {
                Some(p) => p,
                None => continue,
            };
            let d = d + self.nodes[n].ifaces[i].delay_ms;
            if self.nodes[peer].role.has_control_plane() {
                if visited.insert((peer, peer_iface)) {
                    for out in self.switch_outputs(state, peer, peer_iface, count) {
                        queue.push_back((peer, out, d));
                    }
                }
            } else if self.nodes[peer].ifaces[peer_iface].addr.map(|a| a.addr()) == Some(target) {
                return Some((peer, d));
            }
        }
        None
    }

    /// Apply the flow table of a switch to a frame entering on `in_iface`.
    fn switch_outputs(
        &self,
        state: &mut SimState,
        switch: usize,
        in_iface: usize,
        count: u64,
    ) -> Vec<usize> {
        let in_port = self.port_number(in_iface);
        let action = match state.flows[switch].iter_mut().find(|f| f.matches(in_port)) {
            Some(flow) => {
                flow.n_packets += count;
                flow.action
            }
            // table miss
            None => FlowAction::Drop,
        };
        match action {
            FlowAction::Drop => Vec::new(),
            FlowAction::Output(port) if port == in_port => Vec::new(),
            FlowAction::Output(port) => self.iface_of_port(switch, port).into_iter().collect(),
            FlowAction::Normal => {
                (0..self.nodes[switch].ifaces.len()).filter(|i| *i != in_iface).collect()
            }
        }
    }

    fn ping(&self, node: usize, dest: Ipv4Addr, count: u64) -> ExecOutput {
        let mut state = self.lock();
        let header = format!("PING {} ({}) 56(84) bytes of data.\n", dest, dest);
        let time = (count.max(1) - 1) * 1000;

        // source address of the request
        let source = if self.owns(node, dest) {
            Some(dest)
        } else {
            self.lookup(&state, node, dest)
                .and_then(|r| self.nodes[node].ifaces[r.dev].addr)
                .map(|a| a.addr())
        };

        let request = self.forward(&mut state, node, dest, count);
        let reply = match (request, source) {
            (Forwarding::NoRoute, _) | (_, None) => {
                return ExecOutput {
                    stderr: "ping: connect: Network is unreachable\n".to_string(),
                    status: Some(2),
                    ..Default::default()
                }
            }
            (Forwarding::Arrived { node: dst, delay_ms: d, .. }, Some(source)) => {
                match self.forward(&mut state, dst, source, count) {
                    Forwarding::Arrived { node: back, ttl, delay_ms } if back == node => {
                        Some((ttl, d + delay_ms))
                    }
                    _ => None,
                }
            }
            (Forwarding::Lost, _) => None,
        };

        match reply {
            Some((ttl, delay_ms)) => {
                let rtt = delay_ms as f64 + BASE_RTT_MS;
                let mut stdout = header;
                for seq in 1..=count {
                    stdout.push_str(&format!(
                        "64 bytes from {}: icmp_seq={} ttl={} time={:.3} ms\n",
                        dest, seq, ttl, rtt
                    ));
                }
                stdout.push_str(&format!(
                    "\n--- {} ping statistics ---\n\
                     {} packets transmitted, {} received, 0% packet loss, time {}ms\n\
                     rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/0.000 ms\n",
                    dest, count, count, time, rtt, rtt, rtt
                ));
                ExecOutput { stdout, status: Some(0), ..Default::default() }
            }
            None => ExecOutput {
                stdout: format!(
                    "{}\n--- {} ping statistics ---\n\
                     {} packets transmitted, 0 received, 100% packet loss, time {}ms\n",
                    header, dest, count, time
                ),
                status: Some(1),
                ..Default::default()
            },
        }
    }

    fn add_route(&self, node: usize, dest: &str, via: &str) -> ExecOutput {
        let failure = |msg: &str| ExecOutput {
            stderr: format!("{}\n", msg),
            status: Some(2),
            ..Default::default()
        };
        let dest: Ipv4Cidr = if dest == "default" {
            Ipv4Cidr::default_route()
        } else {
            match dest.parse::<Ipv4Cidr>() {
                Ok(d) => d.network(),
                Err(_) => return failure(&format!("Error: invalid prefix \"{}\".", dest)),
            }
        };
        let via: Ipv4Addr = match via.parse() {
            Ok(v) => v,
            Err(_) => return failure(&format!("Error: invalid address \"{}\".", via)),
        };

        let mut state = self.lock();
        let connected = state.routes[node].iter().find(|r| r.via.is_none() && r.dest.contains(via));
        let dev = match connected {
            Some(r) => r.dev,
            None => return failure("Error: Nexthop has invalid gateway."),
        };
        if state.routes[node].iter().any(|r| r.dest == dest) {
            return failure("RTNETLINK answers: File exists");
        }
        state.routes[node].push(Route { dest, via: Some(via), dev });
        ExecOutput { status: Some(0), ..Default::default() }
    }

    fn show_routes(&self, node: usize) -> ExecOutput {
        let state = self.lock();
        let ifaces = &self.nodes[node].ifaces;
        let mut routes: Vec<&Route> = state.routes[node].iter().collect();
        // the default route comes first
        routes.sort_by_key(|r| r.dest.prefix_len() != 0);
        let stdout = routes
            .into_iter()
            .map(|r| {
                let dest = if r.dest.prefix_len() == 0 {
                    "default".to_string()
                } else {
                    r.dest.to_string()
                };
                match (r.via, ifaces[r.dev].addr) {
                    (Some(via), _) => format!("{} via {} dev {}\n", dest, via, ifaces[r.dev].name),
                    (None, Some(src)) => format!(
                        "{} dev {} proto kernel scope link src {}\n",
                        dest,
                        ifaces[r.dev].name,
                        src.addr()
                    ),
                    (None, None) => format!("{} dev {}\n", dest, ifaces[r.dev].name),
                }
            })
            .collect();
        ExecOutput { stdout, status: Some(0), ..Default::default() }
    }

    fn port_report(&self, switch: usize) -> String {
        let node = &self.nodes[switch];
        let ports = node.ifaces.iter().enumerate().map(|(i, iface)| (self.port_number(i), iface));
        match self.layout {
            ReportLayout::Inline => {
                let mut report = format!(
                    "OFPT_FEATURES_REPLY (OF1.3) (xid=0x2): dpid:{:016x}\n\
                     n_tables:254, n_buffers:0\n\
                     capabilities: FLOW_STATS TABLE_STATS PORT_STATS GROUP_STATS QUEUE_STATS\n\
                     OFPST_PORT_DESC reply (OF1.3) (xid=0x3):\n",
                    switch + 1
                );
                for (port, iface) in ports {
                    report.push_str(&format!(
                        " {}({}): addr:02:00:00:{:02x}:{:02x}:00\n     config:     0\n     \
                         state:      0\n     speed: 10000 Mbps now, 0 Mbps max\n",
                        port, iface.name, switch, port
                    ));
                }
                report.push_str(&format!(
                    " LOCAL({}): addr:02:00:00:{:02x}:00:00\n     config:     PORT_DOWN\n     \
                     state:      LINK_DOWN\n     speed: 0 Mbps now, 0 Mbps max\n\
                     OFPT_GET_CONFIG_REPLY (OF1.3) (xid=0x5): frags=normal miss_send_len=0\n",
                    node.name, switch
                ));
                report
            }
            ReportLayout::Tabular => {
                let mut report = format!("Ports of {}\n", node.name);
                for (port, iface) in ports {
                    report.push_str(&format!("PORT {}: {}\n", port, iface.name));
                }
                report
            }
            ReportLayout::Garbage => {
                ports.map(|(port, iface)| format!("{} {}\n", port, iface.name)).collect()
            }
            ReportLayout::Empty => String::new(),
        }
    }

    fn dump_flows(&self, switch: usize) -> String {
        let state = self.lock();
        let mut dump = String::from("OFPST_FLOW reply (OF1.3) (xid=0x2):\n");
        for flow in state.flows[switch].iter() {
            let in_port = flow.in_port.map(|p| format!(",in_port={}", p)).unwrap_or_default();
            let action = match flow.action {
                FlowAction::Drop => "drop".to_string(),
                FlowAction::Output(p) => format!("output:{}", p),
                FlowAction::Normal => "NORMAL".to_string(),
            };
            dump.push_str(&format!(
                " cookie=0x0, table=0, n_packets={}, priority={}{} actions={}\n",
                flow.n_packets, flow.priority, in_port, action
            ));
        }
        dump
    }
}

/// Find the node and interface index of an endpoint
fn locate(
    nodes: &[SimNode],
    index: &HashMap<String, usize>,
    node: &str,
    iface: &str,
) -> Result<(usize, usize), PlatformError> {
    let n = *index.get(node).ok_or_else(|| PlatformError::UnknownNode(node.to_string()))?;
    let i = nodes[n]
        .ifaces
        .iter()
        .position(|i| i.name == iface)
        .ok_or_else(|| PlatformError::Materialize(format!("{} has no interface {}", node, iface)))?;
    Ok((n, i))
}

/// Parse a flow specification like `priority=100,in_port=2,actions=output:3`.
fn parse_flow(spec: &str) -> Result<Flow, String> {
    let spec = spec.trim().trim_matches('"');
    let (matches, actions) = match spec.find("actions=") {
        Some(pos) => {
            let matches = spec[..pos].trim_end_matches(|c: char| c == ',' || c.is_whitespace());
            (matches, &spec[pos + 8..])
        }
        None => return Err("ovs-ofctl: must specify an action".to_string()),
    };

    let mut flow = Flow { priority: 32768, in_port: None, action: FlowAction::Drop, n_packets: 0 };
    for field in matches.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = match field.find('=') {
            Some(pos) => (&field[..pos], &field[pos + 1..]),
            None => (field, ""),
        };
        match key {
            "priority" => {
                flow.priority = value.parse().map_err(|_| format!("invalid priority {}", value))?
            }
            "in_port" => {
                flow.in_port = Some(value.parse().map_err(|_| format!("invalid port {}", value))?)
            }
            _ => return Err(format!("ovs-ofctl: unknown keyword {}", key)),
        }
    }

    let action = actions.trim().to_lowercase();
    flow.action = if action.is_empty() || action == "drop" {
        FlowAction::Drop
    } else if action == "normal" {
        FlowAction::Normal
    } else if let Some(port) = action.strip_prefix("output:") {
        FlowAction::Output(port.parse().map_err(|_| format!("invalid output port {}", port))?)
    } else {
        return Err(format!("ovs-ofctl: unknown action {}", action));
    };
    Ok(flow)
}

impl NetworkHandle for SimNetwork {
    fn exec(&self, node: &str, cmd: &str, _timeout: Duration) -> Result<ExecOutput, PlatformError> {
        let idx = self.node_idx(node)?;
        let cmd = cmd.trim();
        debug!("[{}] {}", node, cmd);
        if self.nodes[idx].role.has_control_plane() {
            return Ok(not_found(cmd));
        }

        if let Some(c) = PING_RE.captures(cmd) {
            let count = c.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
            match c[3].parse() {
                Ok(dest) => Ok(self.ping(idx, dest, count)),
                Err(_) => Ok(ExecOutput {
                    stderr: format!("ping: {}: Name or service not known\n", &c[3]),
                    status: Some(2),
                    ..Default::default()
                }),
            }
        } else if let Some(c) = ROUTE_ADD_RE.captures(cmd) {
            Ok(self.add_route(idx, &c[1], &c[2]))
        } else if ROUTE_SHOW_RE.is_match(cmd) {
            Ok(self.show_routes(idx))
        } else {
            Ok(not_found(cmd))
        }
    }

    fn query(
        &self,
        device: &str,
        query: ControlQuery,
        timeout: Duration,
    ) -> Result<String, PlatformError> {
        let idx = self.switch_idx(device)?;
        if self.unresponsive.contains(device) {
            let what = format!("{:?} on {}", query, device);
            return Err(PlatformError::Timeout { what, timeout });
        }
        Ok(match query {
            ControlQuery::Show => self.port_report(idx),
            ControlQuery::DumpRules => self.dump_flows(idx),
        })
    }

    fn mutate(
        &self,
        device: &str,
        rule: &str,
        timeout: Duration,
    ) -> Result<Mutation, PlatformError> {
        let idx = self.switch_idx(device)?;
        if self.unresponsive.contains(device) {
            return Err(PlatformError::Timeout { what: format!("add-flow on {}", device), timeout });
        }
        if self.read_only.contains(device) {
            return Ok(Mutation {
                accepted: false,
                detail: "OFPT_ERROR (OF1.3) (xid=0x6): OFPBRC_EPERM".to_string(),
            });
        }
        let flow = match parse_flow(rule) {
            Ok(flow) => flow,
            Err(detail) => return Ok(Mutation { accepted: false, detail }),
        };

        let mut state = self.lock();
        let flows = &mut state.flows[idx];
        // a flow with the same match and priority is replaced
        match flows.iter_mut().find(|f| f.priority == flow.priority && f.in_port == flow.in_port) {
            Some(existing) => existing.action = flow.action,
            None => {
                let pos = flows.iter().position(|f| f.priority < flow.priority);
                flows.insert(pos.unwrap_or(flows.len()), flow);
            }
        }
        Ok(Mutation { accepted: true, detail: String::new() })
    }
}

fn not_found(cmd: &str) -> ExecOutput {
    let program = cmd.split_whitespace().next().unwrap_or_default();
    ExecOutput {
        stderr: format!("sh: 1: {}: not found\n", program),
        status: Some(127),
        ..Default::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flowlab::example_scenarios::*;
    use flowlab::Scenario;

    const T: Duration = Duration::from_secs(1);

    fn sdn(options: SimOptions) -> (SimPlatform, SimNetwork) {
        let exp = SdnForwarding::scenario().build().unwrap();
        let mut platform = SimPlatform::new(options);
        let net = platform.materialize(&exp.topology).unwrap();
        (platform, net)
    }

    fn routing() -> SimNetwork {
        let exp = IpRouting::scenario().build().unwrap();
        SimPlatform::default().materialize(&exp.topology).unwrap()
    }

    #[test]
    fn switches_flood_by_default() {
        let (_, net) = sdn(SimOptions::default());
        for src in &["h1", "h2", "h3"] {
            let out = net.exec(src, "ping -c 2 -W 1 10.0.0.3", T).unwrap();
            assert!(out.success(), "{}: {}", src, out.combined());
        }
        let out = net.exec("h1", "ping -c 2 -W 1 10.0.0.3", T).unwrap();
        assert!(out.stdout.contains("2 packets transmitted, 2 received, 0% packet loss"));
        assert!(out.stdout.contains("icmp_seq=2 ttl=64"));
    }

    #[test]
    fn flow_rules() {
        let (_, net) = sdn(SimOptions::default());
        let m = net.mutate("s1", "priority=100,in_port=2,actions=drop", T).unwrap();
        assert!(m.accepted);
        let m = net.mutate("s1", "priority=100,in_port=1,actions=output:3", T).unwrap();
        assert!(m.accepted);

        let h1 = net.exec("h1", "ping -c 1 -W 1 10.0.0.3", T).unwrap();
        let h2 = net.exec("h2", "ping -c 1 -W 1 10.0.0.3", T).unwrap();
        assert!(h1.success());
        assert!(!h2.success());
        assert_eq!(h2.status, Some(1));
        assert!(h2.stdout.contains("100% packet loss"));

        let dump = net.query("s1", ControlQuery::DumpRules, T).unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].ends_with("priority=100,in_port=2 actions=drop"));
        assert!(lines[2].ends_with("priority=100,in_port=1 actions=output:3"));
        assert!(lines[3].ends_with("priority=0 actions=NORMAL"));
    }

    #[test]
    fn same_match_replaces_flow() {
        let (_, net) = sdn(SimOptions::default());
        net.mutate("s1", "priority=100,in_port=2,actions=drop", T).unwrap();
        net.mutate("s1", "priority=100,in_port=2,actions=normal", T).unwrap();
        let dump = net.query("s1", ControlQuery::DumpRules, T).unwrap();
        assert_eq!(dump.lines().count(), 3);
        assert!(net.exec("h2", "ping -c 1 -W 1 10.0.0.3", T).unwrap().success());
    }

    #[test]
    fn invalid_flows_are_rejected() {
        let (_, net) = sdn(SimOptions { read_only: vec!["s2".to_string()], ..Default::default() });
        for rule in &["priority=1,in_port=1", "priority=x,actions=drop", "tp_dst=80,actions=drop"] {
            assert!(!net.mutate("s1", rule, T).unwrap().accepted, "{}", rule);
        }
        let m = net.mutate("s2", "priority=1,actions=drop", T).unwrap();
        assert!(!m.accepted);
        assert!(m.detail.contains("OFPBRC_EPERM"));
        assert!(matches!(
            net.mutate("h1", "priority=1,actions=drop", T),
            Err(PlatformError::NoControlPlane(_))
        ));
        assert!(matches!(
            net.query("s9", ControlQuery::Show, T),
            Err(PlatformError::UnknownNode(_))
        ));
    }

    #[test]
    fn report_layouts() {
        let (_, net) = sdn(SimOptions::default());
        let report = net.query("s1", ControlQuery::Show, T).unwrap();
        assert!(report.contains(" 1(s1-eth1): addr:"));
        assert!(report.contains(" 3(s1-eth3): addr:"));

        let options =
            SimOptions { layout: ReportLayout::Tabular, port_offset: 4, ..Default::default() };
        let (_, net) = sdn(options);
        let report = net.query("s2", ControlQuery::Show, T).unwrap();
        assert_eq!(report, "Ports of s2\nPORT 5: s2-eth1\nPORT 6: s2-eth2\n");

        let (_, net) = sdn(SimOptions { layout: ReportLayout::Empty, ..Default::default() });
        assert_eq!(net.query("s1", ControlQuery::Show, T).unwrap(), "");

        let (_, net) = sdn(SimOptions { unresponsive: vec!["s1".into()], ..Default::default() });
        let err = net.query("s1", ControlQuery::Show, T).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn routes() {
        let net = routing();
        let out = net.exec("h1", "ping -c 1 -W 1 10.0.2.2", T).unwrap();
        assert_eq!(out.status, Some(2));
        assert_eq!(out.stderr, "ping: connect: Network is unreachable\n");

        // neighbors are reachable without any route
        assert!(net.exec("h1", "ping -c 1 -W 1 10.0.0.3", T).unwrap().success());

        let ok = |node: &str, cmd: &str| assert!(net.exec(node, cmd, T).unwrap().success());
        ok("h1", "ip route add default via 10.0.0.3");
        ok("h3", "ip route add default via 10.0.2.1");
        ok("r1", "ip route add 10.0.2.0/24 via 10.0.1.2");

        // no route back yet
        let out = net.exec("h1", "ping -c 1 -W 1 10.0.2.2", T).unwrap();
        assert_eq!(out.status, Some(1));

        ok("r2", "ip route add 10.0.0.0/24 via 10.0.1.1");
        let out = net.exec("h1", "ping -c 1 -W 1 10.0.2.2", T).unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("ttl=62"));

        let table = net.exec("r1", "ip route", T).unwrap().stdout;
        assert!(table.contains("10.0.0.0/24 dev r1-eth0 proto kernel scope link src 10.0.0.3"));
        assert!(table.contains("10.0.2.0/24 via 10.0.1.2 dev r1-eth1"));
    }

    #[test]
    fn route_errors() {
        let net = routing();
        let out = net.exec("h1", "ip route add default via 10.9.9.9", T).unwrap();
        assert_eq!(out.stderr, "Error: Nexthop has invalid gateway.\n");
        assert!(net.exec("h1", "ip route add default via 10.0.0.3", T).unwrap().success());
        let out = net.exec("h1", "ip route add default via 10.0.0.3", T).unwrap();
        assert_eq!(out.status, Some(2));
        assert_eq!(out.stderr, "RTNETLINK answers: File exists\n");
        assert_eq!(net.exec("h1", "traceroute 10.0.2.2", T).unwrap().status, Some(127));
        assert!(matches!(net.exec("h9", "ip route", T), Err(PlatformError::UnknownNode(_))));
    }

    #[test]
    fn default_routes_from_topology() {
        let mut scenario = IpRouting::scenario();
        for node in scenario.nodes.iter_mut().filter(|n| n.name == "h1") {
            node.default_route = Some(Ipv4Addr::new(10, 0, 0, 3));
        }
        let exp = scenario.build().unwrap();
        let net = SimPlatform::default().materialize(&exp.topology).unwrap();
        assert!(net.exec("h1", "ip route", T).unwrap().stdout.starts_with("default via 10.0.0.3"));
    }

    #[test]
    fn link_delay() {
        let json = r#"{
            "name": "delay",
            "nodes": [
                { "name": "h1", "role": "host", "address": "10.0.0.1/24" },
                { "name": "h2", "role": "host", "address": "10.0.0.2/24" }
            ],
            "links": [
                { "a": { "node": "h1" }, "b": { "node": "h2" }, "params": { "delay_ms": 5 } }
            ]
        }"#;
        let exp = Scenario::from_json(json).unwrap().build().unwrap();
        let net = SimPlatform::default().materialize(&exp.topology).unwrap();
        let out = net.exec("h1", "ping -c 1 -W 1 10.0.0.2", T).unwrap();
        assert!(out.stdout.contains("time=10.050 ms"), "{}", out.stdout);
    }

    #[test]
    fn counters() {
        let exp = SdnForwarding::scenario().build().unwrap();
        let options = SimOptions { fail_materialize: true, ..Default::default() };
        let mut platform = SimPlatform::new(options);
        assert!(matches!(platform.materialize(&exp.topology), Err(PlatformError::Materialize(_))));
        assert_eq!(platform.materialized(), 0);

        let mut platform = SimPlatform::default();
        let net = platform.materialize(&exp.topology).unwrap();
        assert_eq!(platform.live(), 1);
        platform.teardown(net).unwrap();
        assert_eq!(platform.live(), 0);
        assert_eq!(platform.torn_down(), 1);
    }
}
