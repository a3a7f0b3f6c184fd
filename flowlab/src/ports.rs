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

//! # Port Resolution
//!
//! A switch assigns its own port numbers to interfaces. Flow rules must use these numbers, while
//! the topology only knows the logical interface names. This module reads the port report of the
//! control plane (the output of `ovs-ofctl show`) and builds the [`PortMapping`] from it.
//!
//! Reports come in different layouts. Each layout is handled by a [`ReportParser`], and the
//! parsers are tried one after the other.

use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

lazy_static! {
    static ref INLINE_RE: Regex = Regex::new(r"(?m)^\s*(\d+)\(([^)\s]+)\):").unwrap();
    static ref TABULAR_RE: Regex = Regex::new(r"(?mi)^\s*port\s+(\d+)\s*:\s*(\S+)").unwrap();
}

/// Parser for one layout of the port report.
pub trait ReportParser: Send + Sync {
    /// Name of the layout, used for logging
    fn name(&self) -> &'static str;

    /// Extract all `(port number, interface name)` pairs from the report. Lines that do not match
    /// the layout are ignored.
    fn parse(&self, report: &str) -> Vec<(u32, String)>;
}

/// Parser for the layout of `ovs-ofctl show`, where every port starts with a line like
/// ` 1(s1-eth1): addr:...`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineParenthesized;

impl ReportParser for InlineParenthesized {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn parse(&self, report: &str) -> Vec<(u32, String)> {
        captures(&INLINE_RE, report)
    }
}

/// Parser for the tabular layout, where every port is reported as `PORT 1: s1-eth1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tabular;

impl ReportParser for Tabular {
    fn name(&self) -> &'static str {
        "tabular"
    }

    fn parse(&self, report: &str) -> Vec<(u32, String)> {
        captures(&TABULAR_RE, report)
    }
}

fn captures(re: &Regex, report: &str) -> Vec<(u32, String)> {
    re.captures_iter(report)
        .filter_map(|c| Some((c.get(1)?.as_str().parse().ok()?, c.get(2)?.as_str().to_string())))
        .collect()
}

/// All known parsers, in the order in which they are tried.
pub fn default_parsers() -> Vec<Box<dyn ReportParser>> {
    vec![Box::new(InlineParenthesized), Box::new(Tabular)]
}

/// Port of a single interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    /// Logical interface name
    pub iface: String,
    /// Runtime port number
    pub port: u32,
    /// The port was found in the report. Otherwise, the port was assigned by fallback defaulting.
    pub reported: bool,
}

/// # Port Mapping
///
/// Mapping from logical interface names to runtime port numbers for one device. Every interface
/// that was expected during resolution has an entry, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    /// Name of the device
    pub device: String,
    /// Ports, in the order of the expected interfaces
    pub ports: Vec<PortEntry>,
    /// The report could not be used at all, and the mapping is the declaration order.
    pub degraded: bool,
    /// Warnings collected during resolution
    pub warnings: Vec<String>,
}

impl PortMapping {
    /// Mapping where the `i`-th expected interface (starting at 1) gets port `i`. The mapping is
    /// marked as degraded.
    pub fn identity(device: impl Into<String>, expected: &[String]) -> Self {
        Self {
            device: device.into(),
            ports: expected
                .iter()
                .enumerate()
                .map(|(i, iface)| PortEntry {
                    iface: iface.clone(),
                    port: i as u32 + 1,
                    reported: false,
                })
                .collect(),
            degraded: true,
            warnings: Vec::new(),
        }
    }

    /// Get the port number of an interface
    pub fn port(&self, iface: &str) -> Option<u32> {
        self.ports.iter().find(|p| p.iface == iface).map(|p| p.port)
    }

    /// Returns true if the mapping contains the interface
    pub fn contains(&self, iface: &str) -> bool {
        self.port(iface).is_some()
    }

    /// Human-readable representation
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .ports
            .iter()
            .map(|p| {
                format!(
                    "{} -> {}{}",
                    p.iface,
                    p.port,
                    if p.reported { "" } else { " (assumed)" }
                )
            })
            .collect();
        if self.degraded {
            lines.push("resolution degraded: using declaration order".to_string());
        }
        lines.extend(self.warnings.iter().map(|w| format!("warning: {}", w)));
        lines.join("\n")
    }
}

/// Resolve the expected interfaces of a device into port numbers, using the report of the
/// control plane. The parsers are tried in order, and the first parser that reports an interface
/// determines its port.
///
/// - Interfaces missing from the report get the next unused port number (starting at 1), in the
///   order in which they are expected. A warning is added for each of them.
/// - If no expected interface is found at all (including the case where no report is available),
///   the result is the identity mapping, marked as degraded.
///
/// This function never fails.
pub fn resolve_ports(
    device: &str,
    expected: &[String],
    report: Option<&str>,
    parsers: &[Box<dyn ReportParser>],
) -> PortMapping {
    let report = match report {
        Some(report) => report,
        None => {
            warn!("No port report for {}, using the declaration order", device);
            let mut mapping = PortMapping::identity(device, expected);
            mapping.warnings.push("no port report available".to_string());
            return mapping;
        }
    };

    let mut found: HashMap<&str, u32> = HashMap::new();
    let mut used: BTreeSet<u32> = BTreeSet::new();
    for parser in parsers {
        let entries = parser.parse(report);
        trace!("parser {} found {} ports on {}", parser.name(), entries.len(), device);
        for (port, name) in entries {
            used.insert(port);
            if let Some(iface) = expected.iter().find(|e| **e == name) {
                found.entry(iface.as_str()).or_insert(port);
            }
        }
    }

    if found.is_empty() {
        warn!("Cannot read the port report of {}, using the declaration order", device);
        let mut mapping = PortMapping::identity(device, expected);
        mapping.warnings.push("no expected interface found in the port report".to_string());
        return mapping;
    }

    let mut warnings = Vec::new();
    let mut ports = Vec::with_capacity(expected.len());
    for iface in expected {
        match found.get(iface.as_str()) {
            Some(port) => {
                ports.push(PortEntry { iface: iface.clone(), port: *port, reported: true })
            }
            None => {
                let port = (1..).find(|p| !used.contains(p)).unwrap_or(0);
                used.insert(port);
                warn!("{} does not report {}, assuming port {}", device, iface, port);
                warnings.push(format!("{} not reported, assuming port {}", iface, port));
                ports.push(PortEntry { iface: iface.clone(), port, reported: false });
            }
        }
    }

    PortMapping { device: device.to_string(), ports, degraded: false, warnings }
}
