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

//! Test the parsers of the port report and the resolution of port mappings.

use crate::ports::*;
use maplit::hashmap;
use std::collections::HashMap;

const OVS_SHOW: &str = "OFPT_FEATURES_REPLY (OF1.3) (xid=0x2): dpid:0000000000000001
n_tables:254, n_buffers:0
capabilities: FLOW_STATS TABLE_STATS PORT_STATS GROUP_STATS QUEUE_STATS
OFPST_PORT_DESC reply (OF1.3) (xid=0x3):
 1(s1-eth1): addr:5a:1c:9e:42:a0:11
     config:     0
     state:      0
     current:    10GB-FD COPPER
     speed: 10000 Mbps now, 0 Mbps max
 2(s1-eth2): addr:c6:02:31:8d:70:4e
     config:     0
     state:      0
     current:    10GB-FD COPPER
     speed: 10000 Mbps now, 0 Mbps max
 3(s1-eth3): addr:d2:6b:5e:12:9f:03
     config:     0
     state:      0
     current:    10GB-FD COPPER
     speed: 10000 Mbps now, 0 Mbps max
 LOCAL(s1): addr:ce:0e:7b:a5:b4:4d
     config:     PORT_DOWN
     state:      LINK_DOWN
     speed: 0 Mbps now, 0 Mbps max
OFPT_GET_CONFIG_REPLY (OF1.3) (xid=0x5): frags=normal miss_send_len=0
";

const TABULAR: &str = "Ports of s1
PORT 7: s1-eth1
port 9 : s1-eth3
";

fn expected() -> Vec<String> {
    vec!["s1-eth1".to_string(), "s1-eth2".to_string(), "s1-eth3".to_string()]
}

fn as_map(mapping: &PortMapping) -> HashMap<&str, u32> {
    mapping.ports.iter().map(|p| (p.iface.as_str(), p.port)).collect()
}

#[test]
fn inline_parser() {
    let ports = InlineParenthesized.parse(OVS_SHOW);
    assert_eq!(
        ports,
        vec![(1, "s1-eth1".to_string()), (2, "s1-eth2".to_string()), (3, "s1-eth3".to_string())]
    );
    assert!(InlineParenthesized.parse(TABULAR).is_empty());
}

#[test]
fn tabular_parser() {
    let ports = Tabular.parse(TABULAR);
    assert_eq!(ports, vec![(7, "s1-eth1".to_string()), (9, "s1-eth3".to_string())]);
    assert!(Tabular.parse(OVS_SHOW).is_empty());
}

#[test]
fn resolve_inline_report() {
    let mapping = resolve_ports("s1", &expected(), Some(OVS_SHOW), &default_parsers());
    assert!(!mapping.degraded);
    assert!(mapping.warnings.is_empty());
    assert_eq!(as_map(&mapping), hashmap! {"s1-eth1" => 1, "s1-eth2" => 2, "s1-eth3" => 3});
    assert!(mapping.ports.iter().all(|p| p.reported));
}

#[test]
fn resolve_shifted_report() {
    let report = " 4(s1-eth1): addr:00\n 6(s1-eth2): addr:00\n 5(s1-eth3): addr:00\n";
    let mapping = resolve_ports("s1", &expected(), Some(report), &default_parsers());
    assert!(!mapping.degraded);
    assert_eq!(as_map(&mapping), hashmap! {"s1-eth1" => 4, "s1-eth2" => 6, "s1-eth3" => 5});
}

#[test]
fn missing_interfaces_get_next_unused_port() {
    // s1-eth2 is missing, ports 7 and 9 are used
    let mapping = resolve_ports("s1", &expected(), Some(TABULAR), &default_parsers());
    assert!(!mapping.degraded);
    assert_eq!(as_map(&mapping), hashmap! {"s1-eth1" => 7, "s1-eth2" => 1, "s1-eth3" => 9});
    assert_eq!(mapping.warnings.len(), 1);
    assert!(!mapping.ports[1].reported);

    // ports 1 and 2 are taken by other interfaces
    let report = " 1(s1-eth3): addr:00\n 2(other): addr:00\n";
    let mapping = resolve_ports("s1", &expected(), Some(report), &default_parsers());
    assert_eq!(as_map(&mapping), hashmap! {"s1-eth1" => 3, "s1-eth2" => 4, "s1-eth3" => 1});
    assert_eq!(mapping.warnings.len(), 2);
}

#[test]
fn first_parser_wins() {
    let report = " 3(s1-eth1): addr:00\nPORT 5: s1-eth1\nPORT 6: s1-eth2\n";
    let mapping = resolve_ports("s1", &expected(), Some(report), &default_parsers());
    assert_eq!(mapping.port("s1-eth1"), Some(3));
    assert_eq!(mapping.port("s1-eth2"), Some(6));
    assert_eq!(mapping.port("s1-eth3"), Some(1));
}

#[test]
fn degraded_on_unparsable_report() {
    for report in &["", "ovs-ofctl: s1 is not a bridge or a socket", "1 s1-eth1\n2 s1-eth2"] {
        let mapping = resolve_ports("s1", &expected(), Some(*report), &default_parsers());
        assert!(mapping.degraded);
        assert_eq!(as_map(&mapping), hashmap! {"s1-eth1" => 1, "s1-eth2" => 2, "s1-eth3" => 3});
    }
}

#[test]
fn degraded_without_report() {
    let mapping = resolve_ports("s1", &expected(), None, &default_parsers());
    assert!(mapping.degraded);
    assert_eq!(mapping.ports.len(), 3);
    assert_eq!(mapping.port("s1-eth3"), Some(3));
    assert_eq!(mapping, {
        let mut m = PortMapping::identity("s1", &expected());
        m.warnings = mapping.warnings.clone();
        m
    });
    assert!(mapping.summary().contains("resolution degraded"));
}

#[test]
fn degraded_when_only_unexpected_ports() {
    let report = " 1(other-eth1): addr:00\n 2(other-eth2): addr:00\n";
    let mapping = resolve_ports("s1", &expected(), Some(report), &default_parsers());
    assert!(mapping.degraded);
    assert_eq!(mapping.port("s1-eth1"), Some(1));
}

#[test]
fn no_parsers() {
    let mapping = resolve_ports("s1", &expected(), Some(OVS_SHOW), &[]);
    assert!(mapping.degraded);
}
