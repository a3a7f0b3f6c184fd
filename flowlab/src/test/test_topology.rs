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

//! Test the construction and the checks of the topology.

use crate::topology::{LinkEnd, LinkParams, NodeRole::*, Topology};
use crate::{ConfigError, Ipv4Cidr};
use std::net::Ipv4Addr;

fn addr(s: &str) -> Ipv4Cidr {
    s.parse().unwrap()
}

/// # Test topology
///
/// ```text
/// h1 ---- s1 ---- s2 ---- h3
///         |
///         h2
/// ```
fn get_switched_topo() -> Topology {
    let mut t = Topology::new();
    let h1 = t.add_node("h1", Host, Some(addr("10.0.0.1/24"))).unwrap();
    let h2 = t.add_node("h2", Host, Some(addr("10.0.0.2/24"))).unwrap();
    let h3 = t.add_node("h3", Host, Some(addr("10.0.0.3/24"))).unwrap();
    let s1 = t.add_node("s1", Switch, None).unwrap();
    let s2 = t.add_node("s2", Switch, None).unwrap();
    t.add_link(LinkEnd::new(h1), LinkEnd::new(s1)).unwrap();
    t.add_link(LinkEnd::new(h2), LinkEnd::new(s1)).unwrap();
    t.add_link(LinkEnd::new(s1), LinkEnd::new(s2)).unwrap();
    t.add_link(LinkEnd::new(s2), LinkEnd::new(h3)).unwrap();
    t
}

#[test]
fn default_interface_names() {
    let t = get_switched_topo();
    assert_eq!(t.declared_interfaces("h1"), vec!["h1-eth0"]);
    assert_eq!(t.declared_interfaces("s1"), vec!["s1-eth1", "s1-eth2", "s1-eth3"]);
    assert_eq!(t.declared_interfaces("s2"), vec!["s2-eth1", "s2-eth2"]);
    assert!(t.declared_interfaces("x").is_empty());
    assert_eq!(t.control_plane_devices(), vec!["s1", "s2"]);
}

#[test]
fn address_plan_on_first_interface() {
    let t = get_switched_topo();
    let h1 = t.node_by_name("h1").unwrap();
    assert_eq!(h1.interfaces()[0].addr, Some(addr("10.0.0.1/24")));
    assert_eq!(h1.primary_address(), Some(addr("10.0.0.1/24")));
    let s1 = t.node_by_name("s1").unwrap();
    assert!(s1.interfaces().iter().all(|i| i.addr.is_none()));
    assert_eq!(s1.primary_address(), None);
}

#[test]
fn peers() {
    let t = get_switched_topo();
    let s1 = t.node_by_name("s1").unwrap();
    let peer = &s1.interface("s1-eth3").unwrap().peer;
    assert_eq!(t.endpoint_node_name(peer), "s2");
    assert_eq!(peer.iface, "s2-eth1");
    assert_eq!(t.num_nodes(), 5);
    assert_eq!(t.num_links(), 4);
}

#[test]
fn duplicate_names() {
    let mut t = get_switched_topo();
    assert!(matches!(t.add_node("h1", Host, None), Err(ConfigError::DuplicateNode(_))));
    assert!(matches!(t.add_node("", Host, None), Err(ConfigError::InvalidNodeName(_))));
    assert!(matches!(t.add_node("a b", Host, None), Err(ConfigError::InvalidNodeName(_))));
    let h4 = t.add_node("h4", Host, None).unwrap();
    let s1 = t.node_id("s1").unwrap();
    assert!(matches!(
        t.add_link(LinkEnd::new(h4), LinkEnd::new(s1).iface("s1-eth2")),
        Err(ConfigError::DuplicateInterface { .. })
    ));
    // the failed link must not leave any interface behind
    assert!(t.declared_interfaces("h4").is_empty());
    t.add_link(LinkEnd::new(h4), LinkEnd::new(s1)).unwrap();
    assert_eq!(t.declared_interfaces("s1").last().unwrap(), "s1-eth4");
}

#[test]
fn interface_name_limits() {
    let mut t = Topology::new();
    let main = t.add_node("router-main", Router, None).unwrap();
    let h1 = t.add_node("h1", Host, None).unwrap();
    let h2 = t.add_node("h2", Host, None).unwrap();
    // the default name router-main-eth0 exceeds the kernel limit
    assert!(matches!(
        t.add_link(LinkEnd::new(main), LinkEnd::new(h1)),
        Err(ConfigError::InvalidInterfaceName { .. })
    ));
    assert!(matches!(
        t.add_link(LinkEnd::new(h1), LinkEnd::new(h2).iface("a/b")),
        Err(ConfigError::InvalidInterfaceName { .. })
    ));
    t.add_link(LinkEnd::new(main).iface("main-eth0"), LinkEnd::new(h1).iface("eth0")).unwrap();
    // names only need to be unique per node
    t.add_link(LinkEnd::new(main).iface("main-eth1"), LinkEnd::new(h2).iface("eth0")).unwrap();
    assert_eq!(t.declared_interfaces("h2"), vec!["eth0"]);
}

#[test]
fn address_checks() {
    let mut t = Topology::new();
    let h1 = t.add_node("h1", Host, None).unwrap();
    let h2 = t.add_node("h2", Host, None).unwrap();
    let r1 = t.add_node("r1", Router, None).unwrap();
    let s1 = t.add_node("s1", Switch, None).unwrap();
    assert!(matches!(
        t.add_node("s2", Switch, Some(addr("10.0.0.1/24"))),
        Err(ConfigError::AddressOnSwitch(_))
    ));
    assert!(matches!(
        t.add_link(LinkEnd::new(h1), LinkEnd::new(s1).addr(addr("10.0.0.2/24"))),
        Err(ConfigError::AddressOnSwitch(_))
    ));
    assert!(matches!(
        t.add_link(
            LinkEnd::new(h1).addr(addr("10.0.0.1/24")),
            LinkEnd::new(r1).addr(addr("10.0.1.1/24"))
        ),
        Err(ConfigError::SubnetMismatch(_, _))
    ));
    let self_loop = t.add_link(LinkEnd::new(h2), LinkEnd::new(h2));
    assert!(matches!(self_loop, Err(ConfigError::SelfLoop(_))));
    t.add_link(
        LinkEnd::new(h1).addr(addr("10.0.0.1/24")),
        LinkEnd::new(r1).addr(addr("10.0.0.3/24")),
    )
    .unwrap();
}

#[test]
fn broadcast_domain() {
    let mut t = get_switched_topo();
    assert!(t.validate().is_ok());

    // h4 is behind s2, which is in the same broadcast domain as s1
    let h4 = t.add_node("h4", Host, Some(addr("10.0.9.4/24"))).unwrap();
    let s2 = t.node_id("s2").unwrap();
    t.add_link(LinkEnd::new(h4), LinkEnd::new(s2)).unwrap();
    assert!(matches!(t.validate(), Err(ConfigError::BroadcastDomainMismatch(_, _))));
}

#[test]
fn separate_broadcast_domains() {
    let mut t = Topology::new();
    let h1 = t.add_node("h1", Host, Some(addr("10.0.0.1/24"))).unwrap();
    let h2 = t.add_node("h2", Host, Some(addr("10.0.1.1/24"))).unwrap();
    let s1 = t.add_node("s1", Switch, None).unwrap();
    let s2 = t.add_node("s2", Switch, None).unwrap();
    t.add_link(LinkEnd::new(h1), LinkEnd::new(s1)).unwrap();
    t.add_link(LinkEnd::new(h2), LinkEnd::new(s2)).unwrap();
    assert!(t.validate().is_ok());
}

#[test]
fn sealing() {
    let mut t = get_switched_topo();
    t.seal();
    let h1 = t.node_id("h1").unwrap();
    let s1 = t.node_id("s1").unwrap();
    assert!(t.node(h1).unwrap().is_sealed());
    assert!(matches!(
        t.add_link(LinkEnd::new(h1), LinkEnd::new(s1)),
        Err(ConfigError::NodeSealed(_))
    ));
    assert!(matches!(t.add_node("h4", Host, None), Ok(_)));
}

#[test]
fn routes_and_params() {
    let mut t = Topology::new();
    let h1 = t.add_node("h1", Host, Some(addr("10.0.0.1/24"))).unwrap();
    let r1 = t.add_node("r1", Router, Some(addr("10.0.0.3/24"))).unwrap();
    let s1 = t.add_node("s1", Switch, None).unwrap();
    let link = t.add_link(LinkEnd::new(h1), LinkEnd::new(r1)).unwrap();
    let gw = Ipv4Addr::new(10, 0, 0, 3);
    t.set_default_route(h1, gw).unwrap();
    assert_eq!(t.node(h1).unwrap().default_route(), Some(gw));
    assert!(matches!(t.set_default_route(s1, gw), Err(ConfigError::RouteOnSwitch(_))));

    let params = LinkParams { bandwidth_mbit: Some(10), delay_ms: Some(5) };
    t.set_link_params(link, params).unwrap();
    assert_eq!(t.links().next().unwrap().params, params);
    let summary = t.summary();
    assert!(summary.contains("h1-eth0 10.0.0.1/24 <-> r1:r1-eth0"));
    assert!(summary.contains("default via 10.0.0.3"));
    assert!(summary.contains("(bw 10 Mbit/s, delay 5 ms)"));
}
