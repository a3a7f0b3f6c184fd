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

//! # SDN Forwarding Scenario

use super::ExampleScenario;
use crate::policy::{DevicePolicy, PolicyRule};
use crate::scenario::{EndSpec, LinkSpec, NodeSpec, ProbeSpec, Scenario};
use crate::topology::NodeRole::*;

/// # SDN Forwarding
///
/// Three hosts in the same network, attached to two OpenFlow switches. Before the policy is
/// installed, both switches forward normally and all hosts reach each other.
///
/// ```text
///   h1 ---- s1-eth1
///              s1 s1-eth3 ---- s2-eth1 s2 s2-eth2 ---- h3
///   h2 ---- s1-eth2
/// ```
///
/// Policy on s1 (both with priority 100):
/// - Drop everything arriving from h2 (`in_port=s1-eth2`)
/// - Send everything arriving from h1 towards s2 (`in_port=s1-eth1 -> s1-eth3`)
///
/// The reverse path is not part of the policy. Replies are forwarded by the default rule of s1.
pub struct SdnForwarding {}

impl ExampleScenario for SdnForwarding {
    fn scenario() -> Scenario {
        let nodes = vec![
            NodeSpec::new("h1", Host, Some("10.0.0.1/24".parse().unwrap())),
            NodeSpec::new("h2", Host, Some("10.0.0.2/24".parse().unwrap())),
            NodeSpec::new("h3", Host, Some("10.0.0.3/24".parse().unwrap())),
            NodeSpec::new("s1", Switch, None),
            NodeSpec::new("s2", Switch, None),
        ];

        // interface names follow from the declaration order
        let links = vec![
            LinkSpec::new(EndSpec::node("h1"), EndSpec::node("s1")),
            LinkSpec::new(EndSpec::node("h2"), EndSpec::node("s1")),
            LinkSpec::new(EndSpec::node("s1"), EndSpec::node("s2")),
            LinkSpec::new(EndSpec::node("s2"), EndSpec::node("h3")),
        ];

        let policy = vec![DevicePolicy::new(
            "s1",
            vec![
                PolicyRule::drop_from(100, "s1-eth2"),
                PolicyRule::forward(100, "s1-eth1", "s1-eth3"),
            ],
        )];

        let probes = vec![ProbeSpec::new("h1", "h3"), ProbeSpec::new("h2", "h3")];

        let name = "SDN forwarding with flow rules".to_string();
        Scenario { name, nodes, links, policy, probes }
    }
}
