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

//! # Forwarding Policy
//!
//! Policy rules describe the forwarding behavior of a single device. Switches receive OpenFlow
//! rules, matching on the input interface and either dropping the packet or sending it out of an
//! interface. Hosts and routers receive static routes. Rules only reference logical interface
//! names. They are rendered into commands using the [`PortMapping`] of the device.
//!
//! Rules are submitted in the order of descending priority. Rules with the same priority keep their
//! declaration order.

use crate::ports::PortMapping;
use crate::topology::NodeRole;
use crate::{Ipv4Cidr, RuleError};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::net::Ipv4Addr;

/// Priority used for static routes, which have no priority on their own.
pub const ROUTE_PRIORITY: u16 = 0;

/// Match part of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleMatch {
    /// Match every packet
    Any,
    /// Match packets arriving at the given interface
    InPort {
        /// Logical interface name
        iface: String,
    },
}

impl Default for RuleMatch {
    fn default() -> Self {
        Self::Any
    }
}

/// Action part of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Drop the packet
    Drop,
    /// Send the packet out of the given interface
    Output {
        /// Logical interface name
        iface: String,
    },
    /// Route everything without a more specific route to the next hop
    DefaultRoute {
        /// Next hop
        via: Ipv4Addr,
    },
    /// Route the subnet to the next hop
    SubnetRoute {
        /// Destination network
        subnet: Ipv4Cidr,
        /// Next hop
        via: Ipv4Addr,
    },
}

impl RuleAction {
    /// Returns true if the action is a static route
    pub fn is_route(&self) -> bool {
        matches!(self, Self::DefaultRoute { .. } | Self::SubnetRoute { .. })
    }
}

/// A single forwarding rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Priority, higher priorities are submitted first
    #[serde(default)]
    pub priority: u16,
    /// Match
    #[serde(default, rename = "match")]
    pub matches: RuleMatch,
    /// Action
    pub action: RuleAction,
}

impl PolicyRule {
    /// Drop all packets arriving at `iface`
    pub fn drop_from(priority: u16, iface: impl Into<String>) -> Self {
        Self {
            priority,
            matches: RuleMatch::InPort { iface: iface.into() },
            action: RuleAction::Drop,
        }
    }

    /// Send all packets arriving at `from` out of `to`
    pub fn forward(priority: u16, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            priority,
            matches: RuleMatch::InPort { iface: from.into() },
            action: RuleAction::Output { iface: to.into() },
        }
    }

    /// Default route via a next hop
    pub fn default_route(via: Ipv4Addr) -> Self {
        Self {
            priority: ROUTE_PRIORITY,
            matches: RuleMatch::Any,
            action: RuleAction::DefaultRoute { via },
        }
    }

    /// Route to a subnet via a next hop
    pub fn subnet_route(subnet: Ipv4Cidr, via: Ipv4Addr) -> Self {
        Self {
            priority: ROUTE_PRIORITY,
            matches: RuleMatch::Any,
            action: RuleAction::SubnetRoute { subnet: subnet.network(), via },
        }
    }

    /// Render the rule for a device with the given role. Flow rules need the port mapping of the
    /// device.
    ///
    /// ```
    /// # use flowlab::{PolicyRule, NodeRole, PortMapping};
    /// let mapping = PortMapping::identity("s1", &["s1-eth1".into(), "s1-eth2".into()]);
    /// let rule = PolicyRule::forward(100, "s1-eth1", "s1-eth2");
    /// let rendered = rule.render(NodeRole::Switch, Some(&mapping)).unwrap();
    /// assert_eq!(rendered.text(), "priority=100,in_port=1,actions=output:2");
    /// ```
    pub fn render(
        &self,
        role: NodeRole,
        mapping: Option<&PortMapping>,
    ) -> Result<RenderedRule, RuleError> {
        match &self.action {
            RuleAction::DefaultRoute { via } => {
                self.check_route(role)?;
                Ok(RenderedRule::Route(format!("ip route add default via {}", via)))
            }
            RuleAction::SubnetRoute { subnet, via } => {
                self.check_route(role)?;
                Ok(RenderedRule::Route(format!("ip route add {} via {}", subnet.network(), via)))
            }
            RuleAction::Drop => {
                let spec = self.flow_match(role, mapping)?;
                Ok(RenderedRule::Flow(format!("{},actions=drop", spec)))
            }
            RuleAction::Output { iface } => {
                let spec = self.flow_match(role, mapping)?;
                let out = port_of(mapping, iface)?;
                Ok(RenderedRule::Flow(format!("{},actions=output:{}", spec, out)))
            }
        }
    }

    fn check_route(&self, role: NodeRole) -> Result<(), RuleError> {
        if !role.has_routing_table() {
            Err(RuleError::RouteOnSwitch(role))
        } else if self.matches != RuleMatch::Any {
            Err(RuleError::MatchOnRoute)
        } else {
            Ok(())
        }
    }

    fn flow_match(
        &self,
        role: NodeRole,
        mapping: Option<&PortMapping>,
    ) -> Result<String, RuleError> {
        if !role.has_control_plane() {
            return Err(RuleError::FlowOnRoutingDevice(role));
        }
        match &self.matches {
            RuleMatch::Any => Ok(format!("priority={}", self.priority)),
            RuleMatch::InPort { iface } => {
                Ok(format!("priority={},in_port={}", self.priority, port_of(mapping, iface)?))
            }
        }
    }
}

fn port_of(mapping: Option<&PortMapping>, iface: &str) -> Result<u32, RuleError> {
    mapping
        .ok_or(RuleError::NoPortMapping)?
        .port(iface)
        .ok_or_else(|| RuleError::UnknownInterface(iface.to_string()))
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            RuleAction::DefaultRoute { via } => write!(f, "default via {}", via),
            RuleAction::SubnetRoute { subnet, via } => write!(f, "{} via {}", subnet, via),
            action => {
                write!(f, "priority {}: ", self.priority)?;
                match &self.matches {
                    RuleMatch::Any => write!(f, "any")?,
                    RuleMatch::InPort { iface } => write!(f, "in {}", iface)?,
                }
                match action {
                    RuleAction::Output { iface } => write!(f, " -> out {}", iface),
                    _ => write!(f, " -> drop"),
                }
            }
        }
    }
}

/// Rule rendered for a specific device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum RenderedRule {
    /// OpenFlow rule specification, submitted through the control plane
    Flow(String),
    /// Route command, executed on the device
    Route(String),
}

impl RenderedRule {
    /// The rendered text
    pub fn text(&self) -> &str {
        match self {
            Self::Flow(s) | Self::Route(s) => s,
        }
    }

    /// The command an operator would type into the emulator console to apply the rule.
    ///
    /// ```
    /// # use flowlab::policy::RenderedRule;
    /// let rule = RenderedRule::Flow("priority=100,in_port=2,actions=drop".into());
    /// assert_eq!(
    ///     rule.operator_command("s1"),
    ///     "ovs-ofctl -O OpenFlow13 add-flow s1 \"priority=100,in_port=2,actions=drop\""
    /// );
    /// ```
    pub fn operator_command(&self, device: &str) -> String {
        match self {
            Self::Flow(spec) => format!("ovs-ofctl -O OpenFlow13 add-flow {} \"{}\"", device, spec),
            Self::Route(cmd) => format!("{} {}", device, cmd),
        }
    }
}

/// All rules of a single device, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePolicy {
    /// Device name
    pub device: String,
    /// Rules, in declaration order
    pub rules: Vec<PolicyRule>,
}

impl DevicePolicy {
    /// Create a new device policy
    pub fn new(device: impl Into<String>, rules: Vec<PolicyRule>) -> Self {
        Self { device: device.into(), rules }
    }

    /// Returns true if at least one rule needs a port mapping
    pub fn needs_port_mapping(&self) -> bool {
        self.rules.iter().any(|r| !r.action.is_route())
    }
}

/// Order in which the rules are submitted: descending priority, ties in declaration order.
pub fn submission_order(rules: &[PolicyRule]) -> Vec<&PolicyRule> {
    rules.iter().sorted_by_key(|r| Reverse(r.priority)).collect()
}

/// Status of a rule during installation.
///
/// ```text
/// Pending -> Submitted -> Installed
///                      -> Failed
/// ```
///
/// Rules that cannot be rendered never leave `Pending`, and end up as `ConfigurationError`. Rules
/// which are handed to the operator instead of being submitted are `Delegated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    /// Not yet submitted
    Pending,
    /// Submitted, waiting for the answer
    Submitted,
    /// Accepted by the device
    Installed,
    /// Rejected by the device, or the submission timed out
    Failed {
        /// Raw answer of the device
        detail: String,
    },
    /// The rule cannot be rendered for this device
    ConfigurationError {
        /// Reason
        reason: String,
    },
    /// The rule is applied by the operator
    Delegated,
}

impl RuleStatus {
    /// Returns true if the rule reached a final state
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending | Self::Submitted)
    }

    /// Advance `Pending -> Submitted`. All other states are kept.
    pub fn submit(self) -> Self {
        match self {
            Self::Pending => Self::Submitted,
            s => s,
        }
    }

    /// Finish a submitted rule. Only `Submitted` can be finished, all other states are kept.
    pub fn finish(self, accepted: bool, detail: impl Into<String>) -> Self {
        match self {
            Self::Submitted if accepted => Self::Installed,
            Self::Submitted => Self::Failed { detail: detail.into() },
            s => s,
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Submitted => write!(f, "submitted"),
            Self::Installed => write!(f, "installed"),
            Self::Failed { detail } => write!(f, "failed: {}", detail),
            Self::ConfigurationError { reason } => write!(f, "configuration error: {}", reason),
            Self::Delegated => write!(f, "delegated to the operator"),
        }
    }
}

/// Outcome of a single rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    /// Device name
    pub device: String,
    /// The rule as declared
    pub rule: PolicyRule,
    /// The rendered rule, if rendering succeeded
    pub rendered: Option<RenderedRule>,
    /// Final status
    pub status: RuleStatus,
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rendered {
            Some(r) => write!(f, "[{}] {}", self.status, r.operator_command(&self.device)),
            None => write!(f, "[{}] {}: {}", self.status, self.device, self.rule),
        }
    }
}
