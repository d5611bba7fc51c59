//! CIDR parsing and the address-derived attributes of prefixes and IPs

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

use crate::entity::Status;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Missing mask length in '{0}'")]
    MissingMask(String),
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
    #[error("Invalid mask length in '{0}'")]
    InvalidMask(String),
    #[error("Mask length {len} out of range for {addr}")]
    MaskOutOfRange { addr: IpAddr, len: u8 },
}

/// An address with a mask length, e.g. `10.0.0.1/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: IpAddr,
    prefix_len: u8,
}

impl Cidr {
    /// Build from parts, validating the mask against the address family
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, AddressError> {
        if prefix_len > max_prefix_len(&addr) {
            return Err(AddressError::MaskOutOfRange {
                addr,
                len: prefix_len,
            });
        }
        Ok(Self { addr, prefix_len })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// True for an exact host route (/32 or /128)
    pub fn is_host(&self) -> bool {
        self.prefix_len == max_prefix_len(&self.addr)
    }

    /// The prefix this address belongs to, given the network address the
    /// device reported for it. The mask length comes from this address.
    pub fn prefix_with_network(&self, network: IpAddr) -> Result<Cidr, AddressError> {
        Cidr::new(network, self.prefix_len)
    }
}

fn max_prefix_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl FromStr for Cidr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| AddressError::MissingMask(s.to_string()))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| AddressError::InvalidAddress(s.to_string()))?;
        let len: u8 = len
            .parse()
            .map_err(|_| AddressError::InvalidMask(s.to_string()))?;
        Cidr::new(addr, len)
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Serialize for Cidr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Role assigned to an IP address in the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpRole {
    Loopback,
}

impl IpRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
        }
    }
}

/// Host routes are loopbacks; everything else carries no role
pub fn ip_role(address: &Cidr) -> Option<IpRole> {
    address.is_host().then_some(IpRole::Loopback)
}

/// Vendors report `disabled` as a string; only a literal `"false"` is active
pub fn status_from_disabled(disabled: &str) -> Status {
    if disabled == "false" {
        Status::Active
    } else {
        Status::Deprecated
    }
}
