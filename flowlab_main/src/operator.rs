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

//! Operator on the terminal

use flowlab_runtime::Operator;

use log::*;
use std::io::{self, BufRead, Write};

/// Operator reading confirmations from stdin
#[derive(Debug, Default)]
pub struct StdinOperator;

impl Operator for StdinOperator {
    fn hold(&mut self, message: &str) {
        println!("\n{}\n", message);
        print!("Press ENTER to continue...");
        if let Err(e) = io::stdout().flush() {
            warn!("Cannot flush stdout: {}", e);
        }
        let mut line = String::new();
        // EOF on stdin confirms as well
        if let Err(e) = io::stdin().lock().read_line(&mut line) {
            warn!("Cannot read from stdin: {}", e);
        }
    }
}
