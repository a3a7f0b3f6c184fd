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

//! # Port Resolver
//!
//! Queries the port report of a switch and resolves the logical interface names into port numbers.
//! If the control plane does not answer, the mapping falls back to the declaration order.

use crate::platform::{ControlQuery, NetworkHandle};
use flowlab::ports::{default_parsers, resolve_ports, ReportParser};
use flowlab::PortMapping;

use log::*;
use std::fmt;
use std::time::Duration;

/// Resolves port mappings through the control plane
pub struct PortResolver {
    parsers: Vec<Box<dyn ReportParser>>,
    timeout: Duration,
}

impl fmt::Debug for PortResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortResolver")
            .field("parsers", &self.parsers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PortResolver {
    /// Create a resolver using all known report layouts
    pub fn new(timeout: Duration) -> Self {
        Self::with_parsers(default_parsers(), timeout)
    }

    /// Create a resolver with the given parsers, tried in order
    pub fn with_parsers(parsers: Vec<Box<dyn ReportParser>>, timeout: Duration) -> Self {
        Self { parsers, timeout }
    }

    /// Resolve the interfaces of a device. This never fails: if the report cannot be fetched or
    /// read, the mapping is degraded.
    pub fn resolve<H: NetworkHandle + ?Sized>(
        &self,
        handle: &H,
        device: &str,
        expected: &[String],
    ) -> PortMapping {
        let report = match handle.query(device, ControlQuery::Show, self.timeout) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Cannot get the port report of {}: {}", device, e);
                None
            }
        };
        let mapping = resolve_ports(device, expected, report.as_deref(), &self.parsers);
        debug!("port mapping of {}:\n{}", device, mapping.summary());
        mapping
    }
}
