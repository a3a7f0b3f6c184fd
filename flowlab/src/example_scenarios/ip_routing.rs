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

//! # IP Routing Scenario

use super::ExampleScenario;
use crate::policy::{DevicePolicy, PolicyRule};
use crate::scenario::{EndSpec, LinkSpec, NodeSpec, ProbeSpec, Scenario};
use crate::topology::NodeRole::*;
use crate::Ipv4Cidr;

/// # IP Routing
///
/// Three hosts, connected by two routers. No node has any route except for its connected
/// networks, so only neighbors can reach each other before the static routes are installed.
///
/// ```text
///   h1 .1 ---- .3 r1 .1 ---- .2 r2 .1 ---- .2 h3
///   10.0.0.0/24   |   10.0.1.0/24   10.0.2.0/24
///                 .4
///      10.0.3.0/24|
///                 .2
///                 h2
/// ```
///
/// Routes:
/// - h1, h2 and h3 use their router as default gateway
/// - r1 reaches 10.0.2.0/24 via r2
/// - r2 reaches 10.0.0.0/24 and 10.0.3.0/24 via r1
pub struct IpRouting {}

fn addr(s: &str) -> Ipv4Cidr {
    s.parse().unwrap()
}

impl ExampleScenario for IpRouting {
    fn scenario() -> Scenario {
        let nodes = vec![
            NodeSpec::new("h1", Host, Some(addr("10.0.0.1/24"))),
            NodeSpec::new("h2", Host, Some(addr("10.0.3.2/24"))),
            NodeSpec::new("h3", Host, Some(addr("10.0.2.2/24"))),
            NodeSpec::new("r1", Router, None),
            NodeSpec::new("r2", Router, None),
        ];

        let links = vec![
            LinkSpec::new(
                EndSpec::addressed("h1", "h1-eth0", addr("10.0.0.1/24")),
                EndSpec::addressed("r1", "r1-eth0", addr("10.0.0.3/24")),
            ),
            LinkSpec::new(
                EndSpec::addressed("r1", "r1-eth1", addr("10.0.1.1/24")),
                EndSpec::addressed("r2", "r2-eth0", addr("10.0.1.2/24")),
            ),
            LinkSpec::new(
                EndSpec::addressed("r2", "r2-eth1", addr("10.0.2.1/24")),
                EndSpec::addressed("h3", "h3-eth0", addr("10.0.2.2/24")),
            ),
            LinkSpec::new(
                EndSpec::addressed("h2", "h2-eth0", addr("10.0.3.2/24")),
                EndSpec::addressed("r1", "r1-eth2", addr("10.0.3.4/24")),
            ),
        ];

        let policy = vec![
            DevicePolicy::new("h1", vec![PolicyRule::default_route("10.0.0.3".parse().unwrap())]),
            DevicePolicy::new("h2", vec![PolicyRule::default_route("10.0.3.4".parse().unwrap())]),
            DevicePolicy::new("h3", vec![PolicyRule::default_route("10.0.2.1".parse().unwrap())]),
            DevicePolicy::new(
                "r1",
                vec![PolicyRule::subnet_route(addr("10.0.2.0/24"), "10.0.1.2".parse().unwrap())],
            ),
            DevicePolicy::new(
                "r2",
                vec![
                    PolicyRule::subnet_route(addr("10.0.0.0/24"), "10.0.1.1".parse().unwrap()),
                    PolicyRule::subnet_route(addr("10.0.3.0/24"), "10.0.1.1".parse().unwrap()),
                ],
            ),
        ];

        let probes = vec![
            ProbeSpec::new("h1", "10.0.2.2"),
            ProbeSpec::new("h2", "10.0.2.2"),
            ProbeSpec::new("h3", "10.0.0.1"),
            ProbeSpec::new("h3", "10.0.3.2"),
        ];

        Scenario { name: "IP routing with static routes".to_string(), nodes, links, policy, probes }
    }
}
