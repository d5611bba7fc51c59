//! Fact bundles: one device's discovered state, validated at the boundary
//!
//! Collectors hand over loosely shaped documents ([`RawFacts`]) that may use
//! vendor spellings (`mac-address`, `default-name`, `board-name`) and omit
//! optional keys. [`FactBundle::from_raw`] applies every defaulting rule once
//! so the reconciliation code only ever sees typed, complete values.

use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use tracing::debug;

use crate::addressing::{ip_role, status_from_disabled, AddressError, Cidr, IpRole};
use crate::entity::Status;
use crate::iftype::{translate_interface_type, InterfaceType};

#[derive(Error, Debug)]
pub enum FactsError {
    #[error("Device name missing from facts")]
    MissingName,
    #[error("Device {device}: missing required field '{field}'")]
    MissingField { device: String, field: &'static str },
    #[error("Device {device}: invalid address '{address}': {source}")]
    InvalidAddress {
        device: String,
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("Device {device}: invalid network '{network}' for {address}")]
    InvalidNetwork {
        device: String,
        network: String,
        address: String,
    },
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Interface entry as reported by a collector
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInterface {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "mac-address")]
    pub mac_address: Option<String>,
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default, alias = "default-name")]
    pub default_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// IP address entry as reported by a collector
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIpAddress {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default, deserialize_with = "flag_string")]
    pub disabled: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Device document as produced by a collector
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFacts {
    #[serde(default, alias = "hostname", alias = "identity")]
    pub name: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "serial-number")]
    pub serial: Option<String>,
    #[serde(default, alias = "board-name", alias = "hardware")]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<RawInterface>,
    #[serde(default, alias = "ip-addresses")]
    pub ip_addresses: Vec<RawIpAddress>,
}

/// Vendors send the disabled flag as either a JSON bool or a string
fn flag_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|flag| match flag {
        Flag::Bool(b) => b.to_string(),
        Flag::Text(s) => s,
    }))
}

/// A discovered interface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceFact {
    /// Current display name
    pub name: String,
    pub mac_address: Option<String>,
    /// Vendor kind tag (e.g. "ether", "vlan", "bridge")
    pub kind: String,
    /// Factory name that survives renames (e.g. "ether1")
    pub default_name: Option<String>,
    /// Free-text description, empty when the vendor had no comment
    pub description: String,
}

impl InterfaceFact {
    pub fn interface_type(&self) -> InterfaceType {
        translate_interface_type(&self.kind, self.default_name.as_deref())
    }
}

/// A discovered IP address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpFact {
    pub address: Cidr,
    /// Subnet this address belongs to, derived from the reported network
    pub prefix: Cidr,
    /// Display name of the interface carrying the address
    pub interface: String,
    /// Raw disabled flag as reported
    pub disabled: String,
    pub description: String,
}

impl IpFact {
    pub fn status(&self) -> Status {
        status_from_disabled(&self.disabled)
    }

    pub fn role(&self) -> Option<IpRole> {
        ip_role(&self.address)
    }
}

/// Immutable snapshot of one device's discovered state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactBundle {
    pub name: String,
    pub site: String,
    pub role: String,
    pub serial: String,
    /// Hardware model (board name)
    pub model: String,
    /// Normalized software version, if reported
    pub version: Option<String>,
    pub interfaces: Vec<InterfaceFact>,
    pub ip_addresses: Vec<IpFact>,
}

impl FactBundle {
    /// Parse a collector JSON document and validate it
    pub fn from_json(content: &str) -> Result<Self, FactsError> {
        let raw: RawFacts = serde_json::from_str(content)?;
        Self::from_raw(raw)
    }

    /// Validate a raw document, applying all defaulting rules
    pub fn from_raw(raw: RawFacts) -> Result<Self, FactsError> {
        let name = non_empty(raw.name).ok_or(FactsError::MissingName)?;
        let missing = |field| FactsError::MissingField {
            device: name.clone(),
            field,
        };

        let site = non_empty(raw.site)
            .or_else(|| site_from_hostname(&name))
            .ok_or_else(|| missing("site"))?;
        let role = non_empty(raw.role)
            .or_else(|| role_from_hostname(&name))
            .ok_or_else(|| missing("role"))?;
        let serial = non_empty(raw.serial).ok_or_else(|| missing("serial"))?;
        let model = non_empty(raw.model).ok_or_else(|| missing("model"))?;
        let version = non_empty(raw.version).map(|v| normalize_version(&v));

        let mut interfaces = Vec::with_capacity(raw.interfaces.len());
        for iface in raw.interfaces {
            let iface_name = non_empty(iface.name).ok_or_else(|| missing("interface name"))?;
            interfaces.push(InterfaceFact {
                name: iface_name,
                mac_address: non_empty(iface.mac_address),
                kind: non_empty(iface.kind).unwrap_or_default(),
                default_name: non_empty(iface.default_name),
                description: iface.comment.unwrap_or_default(),
            });
        }

        let mut ip_addresses = Vec::with_capacity(raw.ip_addresses.len());
        for ip in raw.ip_addresses {
            let address_str = non_empty(ip.address).ok_or_else(|| missing("address"))?;
            let address: Cidr =
                address_str
                    .parse()
                    .map_err(|source| FactsError::InvalidAddress {
                        device: name.clone(),
                        address: address_str.clone(),
                        source,
                    })?;
            let network_str = non_empty(ip.network).ok_or_else(|| missing("network"))?;
            let invalid_network = || FactsError::InvalidNetwork {
                device: name.clone(),
                network: network_str.clone(),
                address: address_str.clone(),
            };
            let network: IpAddr = network_str.parse().map_err(|_| invalid_network())?;
            let prefix = address
                .prefix_with_network(network)
                .map_err(|_| invalid_network())?;

            ip_addresses.push(IpFact {
                address,
                prefix,
                interface: non_empty(ip.interface).ok_or_else(|| missing("interface"))?,
                disabled: ip.disabled.unwrap_or_else(|| "false".to_string()),
                description: ip.comment.unwrap_or_default(),
            });
        }

        debug!(
            device = %name,
            interfaces = interfaces.len(),
            addresses = ip_addresses.len(),
            "Validated fact bundle"
        );

        Ok(Self {
            name,
            site,
            role,
            serial,
            model,
            version,
            interfaces,
            ip_addresses,
        })
    }

    /// Major component of the software version (e.g. "7" for "7.12.1")
    pub fn major_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .and_then(|v| v.split('.').next())
            .filter(|v| !v.is_empty())
    }

    /// Find an interface by its display name
    pub fn interface(&self, name: &str) -> Option<&InterfaceFact> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Site is everything before the first dash of the hostname
fn site_from_hostname(hostname: &str) -> Option<String> {
    let (site, _) = hostname.split_once('-')?;
    (!site.is_empty()).then(|| site.to_string())
}

/// Role is the second dash-separated segment with its host index stripped
fn role_from_hostname(hostname: &str) -> Option<String> {
    let segment = hostname.split('-').nth(1)?;
    let role = segment.trim_end_matches(|c: char| c.is_ascii_digit());
    (!role.is_empty()).then(|| role.to_string())
}

/// Keep only the first token, dropping channel suffixes like "(stable)"
fn normalize_version(version: &str) -> String {
    version
        .split_whitespace()
        .next()
        .unwrap_or(version)
        .to_string()
}
