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

//! # IPv4 Addresses with prefix length

use crate::ConfigError;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 address together with its prefix length, written as `x.x.x.x/len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a new address. Fails if the prefix length is larger than 32.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, ConfigError> {
        if prefix_len > 32 {
            return Err(ConfigError::InvalidAddress(format!("{}/{}", addr, prefix_len)));
        }
        Ok(Self { addr, prefix_len })
    }

    /// The network `0.0.0.0/0`, containing every address
    pub fn default_route() -> Self {
        Self { addr: Ipv4Addr::UNSPECIFIED, prefix_len: 0 }
    }

    /// The address itself
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// The prefix length
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Network mask as an address
    ///
    /// ```
    /// # use flowlab::Ipv4Cidr;
    /// let addr: Ipv4Cidr = "10.100.22.5/17".parse().unwrap();
    /// assert_eq!(addr.mask().to_string(), "255.255.128.0");
    /// ```
    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.mask_bits())
    }

    /// Get the address, masked with the mask.
    ///
    /// ```
    /// # use flowlab::Ipv4Cidr;
    /// let addr: Ipv4Cidr = "10.100.22.5/16".parse().unwrap();
    /// assert_eq!(addr.network().to_string(), "10.100.0.0/16");
    /// ```
    pub fn network(&self) -> Self {
        Self { addr: Ipv4Addr::from(u32::from(self.addr) & self.mask_bits()), ..*self }
    }

    /// Returns true if the address lies within the network of `self`.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask_bits() == u32::from(self.addr) & self.mask_bits()
    }

    /// Returns true if both addresses have the same prefix length and the same network.
    pub fn same_network(&self, other: &Self) -> bool {
        self.network() == other.network()
    }

    fn mask_bits(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len as u32)
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ConfigError::InvalidAddress(s.to_string());
        let mut parts = s.trim().splitn(2, '/');
        let addr: Ipv4Addr = parts.next().ok_or_else(error)?.parse().map_err(|_| error())?;
        let prefix_len: u8 = parts.next().ok_or_else(error)?.parse().map_err(|_| error())?;
        Self::new(addr, prefix_len).map_err(|_| error())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
