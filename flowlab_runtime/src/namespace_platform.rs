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

//! # Namespace Platform
//!
//! Materializes the topology on the local machine using [`netemu`]: hosts and routers are network
//! namespaces, switches are Open vSwitch bridges and links are veth pairs. This needs root
//! privileges (or `sudo`), `iproute2` and Open vSwitch.

use crate::platform::*;
use flowlab::{NodeRole, Topology};
use netemu::{Emulator, EmulatorConfig, LinkShaping};

use log::*;
use std::collections::HashMap;
use std::time::Duration;

/// Emulation platform based on network namespaces and Open vSwitch
#[derive(Debug, Clone, Default)]
pub struct NamespacePlatform {
    config: EmulatorConfig,
}

impl NamespacePlatform {
    /// Create a new platform
    pub fn new(config: EmulatorConfig) -> Self {
        Self { config }
    }

    /// Configuration of the emulator
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    fn build(&self, emu: &mut Emulator, topology: &Topology) -> Result<(), PlatformError> {
        for node in topology.nodes() {
            match node.role() {
                NodeRole::Switch => emu.add_switch(node.name())?,
                NodeRole::Host => emu.add_host(node.name())?,
                NodeRole::Router => {
                    emu.add_host(node.name())?;
                    emu.enable_forwarding(node.name())?;
                }
            }
        }

        for link in topology.links() {
            let shaping = LinkShaping {
                bandwidth_mbit: link.params.bandwidth_mbit,
                delay_ms: link.params.delay_ms,
            };
            emu.add_link(
                (topology.endpoint_node_name(&link.a), link.a.iface.as_str()),
                (topology.endpoint_node_name(&link.b), link.b.iface.as_str()),
                &shaping,
            )?;
        }

        for node in topology.nodes() {
            for iface in node.interfaces() {
                if let Some(addr) = iface.addr {
                    emu.set_address(node.name(), &iface.name, &addr.to_string())?;
                }
            }
        }

        for node in topology.nodes() {
            if let Some(via) = node.default_route() {
                emu.exec(node.name(), &format!("ip route add default via {}", via), None)?
                    .checked()?;
            }
        }
        Ok(())
    }
}

impl EmulationPlatform for NamespacePlatform {
    type Handle = NamespaceNetwork;

    fn materialize(&mut self, topology: &Topology) -> Result<NamespaceNetwork, PlatformError> {
        let mut emu = Emulator::new(self.config.clone());
        let stale = emu.remove_stale_namespaces()?;
        if stale > 0 {
            warn!("Removed {} namespaces left over from an earlier run", stale);
        }

        if let Err(e) = self.build(&mut emu, topology) {
            error!("Cannot materialize the network: {}", e);
            if let Err(cleanup) = emu.teardown() {
                error!("Cannot remove the partial network: {}", cleanup);
            }
            return Err(e);
        }

        info!("Emulated network with {} nodes created", emu.nodes().len());
        let roles = topology.nodes().map(|n| (n.name().to_string(), n.role())).collect();
        Ok(NamespaceNetwork { emulator: emu, roles })
    }

    fn teardown(&mut self, mut handle: NamespaceNetwork) -> Result<(), PlatformError> {
        Ok(handle.emulator.teardown()?)
    }
}

/// Network materialized by the [`NamespacePlatform`]
#[derive(Debug)]
pub struct NamespaceNetwork {
    emulator: Emulator,
    roles: HashMap<String, NodeRole>,
}

impl NamespaceNetwork {
    /// The underlying emulator
    pub fn emulator(&self) -> &Emulator {
        &self.emulator
    }

    fn check_switch(&self, device: &str) -> Result<(), PlatformError> {
        match self.roles.get(device) {
            Some(role) if role.has_control_plane() => Ok(()),
            Some(_) => Err(PlatformError::NoControlPlane(device.to_string())),
            None => Err(PlatformError::UnknownNode(device.to_string())),
        }
    }

    fn ofctl(
        &self,
        device: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<netemu::CommandOutput, PlatformError> {
        self.check_switch(device)?;
        let out = self.emulator.ofctl(device, args, Some(timeout))?;
        if out.timed_out {
            return Err(PlatformError::Timeout { what: out.command, timeout });
        }
        Ok(out)
    }
}

impl NetworkHandle for NamespaceNetwork {
    fn exec(&self, node: &str, cmd: &str, timeout: Duration) -> Result<ExecOutput, PlatformError> {
        if !self.roles.contains_key(node) {
            return Err(PlatformError::UnknownNode(node.to_string()));
        }
        debug!("[{}] {}", node, cmd);
        Ok(self.emulator.exec(node, cmd, Some(timeout))?.into())
    }

    fn query(
        &self,
        device: &str,
        query: ControlQuery,
        timeout: Duration,
    ) -> Result<String, PlatformError> {
        let command = match query {
            ControlQuery::Show => "show",
            ControlQuery::DumpRules => "dump-flows",
        };
        let out = self.ofctl(device, &[command, device], timeout)?;
        if !out.success() {
            warn!("ovs-ofctl {} {} failed: {}", command, device, out.stderr.trim());
        }
        Ok(out.stdout)
    }

    fn mutate(
        &self,
        device: &str,
        rule: &str,
        timeout: Duration,
    ) -> Result<Mutation, PlatformError> {
        let out = self.ofctl(device, &["add-flow", device, rule], timeout)?;
        Ok(Mutation { accepted: out.success(), detail: out.stderr.trim().to_string() })
    }
}
