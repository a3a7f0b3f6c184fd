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

//! # Linux Network Emulator
//!
//! This is a very simple crate to build small virtual networks on a Linux machine. Hosts and
//! routers are network namespaces, switches are Open vSwitch bridges, and links are veth pairs.
//! Every command is executed with a bounded timeout.
//!
//! ```no_run
//! use netemu::{Emulator, EmulatorConfig, LinkShaping};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut emu = Emulator::new(EmulatorConfig::default());
//!
//!     // create two hosts and a switch
//!     emu.add_host("h1")?;
//!     emu.add_host("h2")?;
//!     emu.add_switch("s1")?;
//!
//!     // connect both hosts to the switch
//!     emu.add_link(("h1", "h1-eth0"), ("s1", "s1-eth1"), &LinkShaping::default())?;
//!     emu.add_link(("h2", "h2-eth0"), ("s1", "s1-eth2"), &LinkShaping::default())?;
//!     emu.set_address("h1", "h1-eth0", "10.0.0.1/24")?;
//!     emu.set_address("h2", "h2-eth0", "10.0.0.2/24")?;
//!
//!     let out = emu.exec("h1", "ping -c 1 -W 1 10.0.0.2", None)?;
//!     println!("{}", out.stdout);
//!
//!     emu.teardown()?;
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

mod emulator;
mod process;
mod types;
pub use emulator::{Emulator, EmulatorConfig};
pub use process::run_command;
pub use types::*;

use std::time::Duration;
use thiserror::Error;

/// # Emulator Error type
#[derive(Debug, Error)]
pub enum Error {
    /// Cannot spawn or communicate with a process
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
    /// Cannot deserialize the output of a command
    #[error("Cannot parse JSON output: {0}")]
    JsonError(#[from] serde_json::error::Error),
    /// A command exited with a non-zero status
    #[error("Command `{command}` failed with status {status:?}: {stderr}")]
    CommandFailed {
        /// The command line
        command: String,
        /// Exit status, if the command exited normally
        status: Option<i32>,
        /// Captured error output
        stderr: String,
    },
    /// A command did not finish in time and was killed
    #[error("Command `{command}` did not finish within {timeout:?}")]
    Timeout {
        /// The command line
        command: String,
        /// The timeout that was exceeded
        timeout: Duration,
    },
    /// The command line is empty
    #[error("Cannot execute an empty command")]
    EmptyCommand,
    /// Name cannot be used as a namespace, bridge or interface name
    #[error("Invalid name: {0}")]
    InvalidName(String),
    /// The node is not part of the emulated network
    #[error("Unknown node: {0}")]
    UnknownNode(String),
    /// The node already exists
    #[error("Node {0} already exists")]
    DuplicateNode(String),
    /// The node is not a bridge
    #[error("Node {0} is not a bridge")]
    NotABridge(String),
}

/// Emulator Result type
pub type Result<T> = core::result::Result<T, Error>;
