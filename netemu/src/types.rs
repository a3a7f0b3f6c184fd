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

//! # Emulator Types

use crate::{Error, Result};

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Kind of an emulated node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmuNodeKind {
    /// Network namespace, used for hosts and routers
    Namespace,
    /// Open vSwitch bridge, living in the root namespace
    Bridge,
}

/// Node Information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmuNode {
    /// Name of the node
    pub name: String,
    /// Kind of the node
    pub kind: EmuNodeKind,
    /// Name of the namespace, if the node is a namespace
    pub namespace: Option<String>,
}

impl EmuNode {
    /// Returns true if the node is a bridge
    pub fn is_bridge(&self) -> bool {
        self.kind == EmuNodeKind::Bridge
    }
}

/// Link Information. Each end is given by the node name and the interface name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmuLink {
    /// Endpoint a (node, interface)
    pub a: (String, String),
    /// Endpoint b (node, interface)
    pub b: (String, String),
}

/// Emulated link characteristics, applied with `tc netem` on both ends of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkShaping {
    /// Bandwidth limit in Mbit/s
    pub bandwidth_mbit: Option<u32>,
    /// One-way delay in milliseconds
    pub delay_ms: Option<u32>,
}

impl LinkShaping {
    /// Returns true if no shaping needs to be applied
    pub fn is_empty(&self) -> bool {
        self.bandwidth_mbit.is_none() && self.delay_ms.is_none()
    }

    /// Arguments for `tc qdisc add dev <iface> root netem ...`
    ///
    /// ```
    /// # use netemu::LinkShaping;
    /// let shaping = LinkShaping { bandwidth_mbit: Some(10), delay_ms: Some(5) };
    /// assert_eq!(shaping.netem_args(), vec!["delay", "5ms", "rate", "10mbit"]);
    /// ```
    pub fn netem_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(delay) = self.delay_ms {
            args.push("delay".to_string());
            args.push(format!("{}ms", delay));
        }
        if let Some(rate) = self.bandwidth_mbit {
            args.push("rate".to_string());
            args.push(format!("{}mbit", rate));
        }
        args
    }
}

/// Captured output of a command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// The command line that was executed
    pub command: String,
    /// Everything the command wrote to stdout
    pub stdout: String,
    /// Everything the command wrote to stderr
    pub stderr: String,
    /// Exit status, `None` if the command was killed
    pub status: Option<i32>,
    /// The command was killed after reaching the timeout
    pub timed_out: bool,
    /// Timeout that was applied
    pub timeout: Duration,
}

impl CommandOutput {
    /// Returns true if the command exited with status 0
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// Turn a failed or timed out command into an error.
    pub fn checked(self) -> Result<Self> {
        if self.timed_out {
            Err(Error::Timeout { command: self.command, timeout: self.timeout })
        } else if self.status != Some(0) {
            Err(Error::CommandFailed {
                command: self.command,
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$ {}\n{}{}", self.command, self.stdout, self.stderr)
    }
}

/// Entry of `ip -j netns list`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub(crate) struct NetnsEntry {
    pub name: String,
    #[serde(default)]
    pub id: Option<u32>,
}
