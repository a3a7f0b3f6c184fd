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

//! # Emulator
//!
//! Handle to a network emulated with namespaces, veth pairs and Open vSwitch bridges.

use crate::process::run_command;
use crate::types::NetnsEntry;
use crate::{CommandOutput, EmuLink, EmuNode, EmuNodeKind, Error, LinkShaping, Result};

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::time::Duration;

lazy_static! {
    // linux interface names are limited to 15 characters
    static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,14}$").unwrap();
}

/// Configuration of the emulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Prefix for all namespace names, such that stale namespaces of an earlier run can be found.
    pub prefix: String,
    /// Execute all commands using `sudo`
    pub sudo: bool,
    /// Timeout for a single setup command
    pub timeout: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self { prefix: "flowlab".to_string(), sudo: true, timeout: Duration::from_secs(10) }
    }
}

/// # Emulator
///
/// Owns all namespaces, bridges and links that were created through it. Calling
/// [`Emulator::teardown`] removes all of them. If the emulator is dropped without being torn down,
/// the teardown happens in `drop`, and errors are only logged.
///
/// All methods are blocking. Methods which only execute commands inside the network take `&self`,
/// such that the emulator can be shared between threads.
#[derive(Debug)]
pub struct Emulator {
    config: EmulatorConfig,
    nodes: Vec<EmuNode>,
    links: Vec<EmuLink>,
    torn_down: bool,
}

impl Emulator {
    /// Create a new, empty emulator. Nothing is created on the system yet.
    pub fn new(config: EmulatorConfig) -> Self {
        Self { config, nodes: Vec::new(), links: Vec::new(), torn_down: false }
    }

    /// Get the configuration
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// All nodes created so far
    pub fn nodes(&self) -> &[EmuNode] {
        &self.nodes
    }

    /// All links created so far
    pub fn links(&self) -> &[EmuLink] {
        &self.links
    }

    /// Name of the namespace of a node
    pub fn namespace_name(&self, node: &str) -> String {
        format!("{}-{}", self.config.prefix, node)
    }

    /// Get the node with the given name
    pub fn node(&self, name: &str) -> Result<&EmuNode> {
        self.nodes.iter().find(|n| n.name == name).ok_or_else(|| Error::UnknownNode(name.into()))
    }

    /// List all namespaces on the system which carry the prefix of this emulator.
    pub fn stale_namespaces(&self) -> Result<Vec<String>> {
        let out = self.run(&["ip", "-j", "netns", "list"])?;
        // iproute2 prints nothing at all if there are no namespaces
        if out.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        let entries: Vec<NetnsEntry> = serde_json::from_str(&out.stdout)?;
        let prefix = format!("{}-", self.config.prefix);
        Ok(entries.into_iter().map(|e| e.name).filter(|n| n.starts_with(&prefix)).collect())
    }

    /// Delete all namespaces left over from an earlier run. Returns the number of deleted
    /// namespaces.
    pub fn remove_stale_namespaces(&self) -> Result<usize> {
        let stale = self.stale_namespaces()?;
        for ns in stale.iter() {
            warn!("Removing stale namespace {}", ns);
            self.run(&["ip", "netns", "delete", ns.as_str()])?;
        }
        Ok(stale.len())
    }

    /// Create a new host (or router), living in its own network namespace.
    pub fn add_host(&mut self, name: &str) -> Result<()> {
        self.check_new_node(name)?;
        let ns = self.namespace_name(name);
        self.run(&["ip", "netns", "add", ns.as_str()])?;
        self.nodes.push(EmuNode {
            name: name.to_string(),
            kind: EmuNodeKind::Namespace,
            namespace: Some(ns.clone()),
        });
        self.run(&["ip", "netns", "exec", ns.as_str(), "ip", "link", "set", "lo", "up"])?;
        debug!("created namespace {}", ns);
        Ok(())
    }

    /// Create a new switch as an Open vSwitch bridge in standalone mode, speaking OpenFlow 1.3.
    /// A bridge with the same name left over from an earlier run is removed first, together with
    /// its flow table.
    pub fn add_switch(&mut self, name: &str) -> Result<()> {
        self.check_new_node(name)?;
        if self.exists(&["ovs-vsctl", "br-exists", name])? {
            warn!("Removing stale bridge {}", name);
            self.run(&["ovs-vsctl", "del-br", name])?;
        }
        self.run(&[
            "ovs-vsctl",
            "add-br",
            name,
            "--",
            "set-fail-mode",
            name,
            "standalone",
            "--",
            "set",
            "bridge",
            name,
            "protocols=OpenFlow13",
        ])?;
        self.nodes.push(EmuNode {
            name: name.to_string(),
            kind: EmuNodeKind::Bridge,
            namespace: None,
        });
        self.run(&["ip", "link", "set", name, "up"])?;
        debug!("created bridge {}", name);
        Ok(())
    }

    /// Create a link between two nodes. Each end is given as a tuple of the node name and the
    /// interface name.
    pub fn add_link(
        &mut self,
        a: (&str, &str),
        b: (&str, &str),
        shaping: &LinkShaping,
    ) -> Result<()> {
        check_name(a.1)?;
        check_name(b.1)?;
        let node_a = self.node(a.0)?.clone();
        let node_b = self.node(b.0)?.clone();

        // the pair is created in the root namespace, where the final names may collide
        let (tmp_a, tmp_b) = self.veth_names();
        let (tmp_a, tmp_b) = (tmp_a.as_str(), tmp_b.as_str());
        self.run(&["ip", "link", "add", tmp_a, "type", "veth", "peer", "name", tmp_b])?;
        let attached = self
            .attach(&node_a, tmp_a, a.1)
            .and_then(|_| self.attach(&node_b, tmp_b, b.1));
        if let Err(e) = attached {
            // deleting one end removes the pair, wherever the other end is
            for &tmp in &[tmp_a, tmp_b] {
                let argv = self.argv(&["ip", "link", "delete", tmp]);
                let _ = run_command(&argv, self.config.timeout);
            }
            return Err(e);
        }
        self.links.push(EmuLink {
            a: (a.0.to_string(), a.1.to_string()),
            b: (b.0.to_string(), b.1.to_string()),
        });

        if !shaping.is_empty() {
            let netem = shaping.netem_args();
            for &(node, iface) in &[(&node_a, a.1), (&node_b, b.1)] {
                let mut args = vec!["tc", "qdisc", "add", "dev", iface, "root", "netem"];
                args.extend(netem.iter().map(|s| s.as_str()));
                self.run_in(node, &args)?;
            }
        }
        debug!("created link {}:{} <-> {}:{}", a.0, a.1, b.0, b.1);
        Ok(())
    }

    /// Assign an address (`x.x.x.x/len`) to an interface
    pub fn set_address(&self, node: &str, iface: &str, cidr: &str) -> Result<()> {
        let node = self.node(node)?;
        self.run_in(node, &["ip", "addr", "add", cidr, "dev", iface])?;
        Ok(())
    }

    /// Enable IPv4 forwarding inside the namespace of a node
    pub fn enable_forwarding(&self, node: &str) -> Result<()> {
        let node = self.node(node)?;
        self.run_in(node, &["sysctl", "-w", "net.ipv4.ip_forward=1"])?;
        Ok(())
    }

    /// Execute a shell command on a node. The command is executed with `sh -c` inside the
    /// namespace of the node, or in the root namespace for bridges. The exit status is not
    /// checked. If `timeout` is `None`, the configured timeout is used.
    pub fn exec(&self, node: &str, cmd: &str, timeout: Option<Duration>) -> Result<CommandOutput> {
        let node = self.node(node)?;
        let argv = self.argv_in(node, &["sh", "-c", cmd]);
        run_command(&argv, timeout.unwrap_or(self.config.timeout))
    }

    /// Execute `ovs-ofctl -O OpenFlow13 <args>` for a bridge. The exit status is not checked.
    pub fn ofctl(
        &self,
        bridge: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        if !self.node(bridge)?.is_bridge() {
            return Err(Error::NotABridge(bridge.to_string()));
        }
        let mut cmd = vec!["ovs-ofctl", "-O", "OpenFlow13"];
        cmd.extend_from_slice(args);
        run_command(&self.argv(&cmd), timeout.unwrap_or(self.config.timeout))
    }

    /// Remove all namespaces, bridges and links. Every element is removed, even if removing an
    /// earlier one failed. The first error is returned.
    pub fn teardown(&mut self) -> Result<()> {
        self.torn_down = true;
        let mut result = Ok(());

        for node in self.nodes.iter() {
            let removed = match node.namespace.as_ref() {
                Some(ns) => self.run(&["ip", "netns", "delete", ns.as_str()]),
                None => self.run(&["ovs-vsctl", "--if-exists", "del-br", node.name.as_str()]),
            };
            if let Err(e) = removed {
                warn!("Cannot remove node {}: {}", node.name, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        // veths in a namespace are gone with the namespace. The rest lives in the root namespace.
        for link in self.links.iter() {
            let argv = self.argv(&["ip", "link", "delete", link.a.1.as_str()]);
            match run_command(&argv, self.config.timeout) {
                Ok(out) if out.success() => debug!("removed veth {}", link.a.1),
                _ => {}
            }
        }

        info!("Emulated network with {} nodes removed", self.nodes.len());
        self.nodes.clear();
        self.links.clear();
        result
    }

    /// Move a fresh veth end onto its node and give it its final name.
    fn attach(&self, node: &EmuNode, tmp: &str, iface: &str) -> Result<()> {
        match node.namespace.as_ref() {
            Some(ns) => {
                let ns = ns.as_str();
                self.run(&["ip", "link", "set", tmp, "netns", ns])?;
                self.run(&["ip", "netns", "exec", ns, "ip", "link", "set", tmp, "name", iface])?;
                self.run(&["ip", "netns", "exec", ns, "ip", "link", "set", iface, "up"])?;
            }
            None => {
                if self.exists(&["ip", "link", "show", iface])? {
                    warn!("Removing stale interface {}", iface);
                    self.run(&["ip", "link", "delete", iface])?;
                }
                self.run(&["ip", "link", "set", tmp, "name", iface])?;
                self.run(&["ovs-vsctl", "add-port", node.name.as_str(), iface])?;
                self.run(&["ip", "link", "set", iface, "up"])?;
            }
        }
        Ok(())
    }

    /// Temporary names of the next veth pair, unique in the root namespace.
    fn veth_names(&self) -> (String, String) {
        let prefix: String = self.config.prefix.chars().take(8).collect();
        let id = self.links.len();
        (format!("{}v{}a", prefix, id), format!("{}v{}b", prefix, id))
    }

    /// Run a command whose exit status answers a yes/no question.
    fn exists(&self, args: &[&str]) -> Result<bool> {
        let out = run_command(&self.argv(args), self.config.timeout)?;
        if out.timed_out {
            return Err(Error::Timeout { command: out.command, timeout: out.timeout });
        }
        Ok(out.success())
    }

    fn check_new_node(&self, name: &str) -> Result<()> {
        check_name(name)?;
        if self.nodes.iter().any(|n| n.name == name) {
            return Err(Error::DuplicateNode(name.to_string()));
        }
        Ok(())
    }

    fn argv(&self, args: &[&str]) -> Vec<String> {
        let sudo = if self.config.sudo { Some("sudo".to_string()) } else { None };
        sudo.into_iter().chain(args.iter().map(|s| s.to_string())).collect()
    }

    fn argv_in(&self, node: &EmuNode, args: &[&str]) -> Vec<String> {
        match node.namespace.as_ref() {
            Some(ns) => {
                let mut full = vec!["ip", "netns", "exec", ns.as_str()];
                full.extend_from_slice(args);
                self.argv(&full)
            }
            None => self.argv(args),
        }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        run_command(&self.argv(args), self.config.timeout)?.checked()
    }

    fn run_in(&self, node: &EmuNode, args: &[&str]) -> Result<CommandOutput> {
        run_command(&self.argv_in(node, args), self.config.timeout)?.checked()
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        if !self.torn_down && !self.nodes.is_empty() {
            if let Err(e) = self.teardown() {
                error!("Cannot remove the emulated network: {}", e);
            }
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}
