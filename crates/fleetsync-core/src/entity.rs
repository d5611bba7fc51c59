//! Inventory entity kinds, records, and natural keys

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addressing::Cidr;

/// Field set of an inventory record
pub type Fields = serde_json::Map<String, Value>;

/// Kind of inventory entity, listed in commit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Site,
    DeviceType,
    Device,
    Interface,
    Prefix,
    IpAddress,
}

impl EntityKind {
    /// All kinds in dependency order: every kind comes after what it references
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Site,
        EntityKind::DeviceType,
        EntityKind::Device,
        EntityKind::Interface,
        EntityKind::Prefix,
        EntityKind::IpAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::DeviceType => "device_type",
            Self::Device => "device",
            Self::Interface => "interface",
            Self::Prefix => "prefix",
            Self::IpAddress => "ip_address",
        }
    }

    /// Whether the natural key is shared across devices.
    ///
    /// Global kinds can be targeted by several device workers at once and
    /// need cross-device serialization; device-scoped kinds cannot.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Self::Site | Self::DeviceType | Self::Prefix | Self::IpAddress
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&RecordId> for Value {
    fn from(id: &RecordId) -> Self {
        Value::String(id.0.clone())
    }
}

/// Lifecycle status written to inventory records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Deprecated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record as stored in the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub kind: EntityKind,
    pub fields: Fields,
}

impl Record {
    /// String value of a field, if present and a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Whether every field in `desired` already holds the same value here.
    /// Fields the record has but `desired` does not mention are ignored.
    pub fn matches(&self, desired: &Fields) -> bool {
        desired.iter().all(|(field, value)| {
            self.fields.get(field).unwrap_or(&Value::Null) == value
        })
    }
}

/// The field/value pairs that locate one entity independent of its id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub kind: EntityKind,
    pub parts: Vec<(String, String)>,
}

impl NaturalKey {
    fn new(kind: EntityKind, parts: &[(&str, &str)]) -> Self {
        Self {
            kind,
            parts: parts
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn site(name: &str) -> Self {
        Self::new(EntityKind::Site, &[("name", name)])
    }

    pub fn device_type(model: &str) -> Self {
        Self::new(EntityKind::DeviceType, &[("model", model)])
    }

    pub fn device(name: &str) -> Self {
        Self::new(EntityKind::Device, &[("name", name)])
    }

    /// Interface key; the vendor default name survives renames so it is
    /// preferred over the display name whenever the device reports one.
    ///
    /// The MAC address is not part of the key: a device plus default name
    /// is already unique, and a replaced port keeps its record.
    pub fn interface(device: &RecordId, name: &str, default_name: Option<&str>) -> Self {
        match default_name {
            Some(default_name) => Self::new(
                EntityKind::Interface,
                &[("device", device.as_str()), ("default_name", default_name)],
            ),
            None => Self::new(
                EntityKind::Interface,
                &[("device", device.as_str()), ("name", name)],
            ),
        }
    }

    pub fn prefix(prefix: &Cidr) -> Self {
        Self::new(EntityKind::Prefix, &[("prefix", &prefix.to_string())])
    }

    pub fn ip_address(address: &Cidr) -> Self {
        Self::new(EntityKind::IpAddress, &[("address", &address.to_string())])
    }

    /// Filter pairs in the shape the inventory client expects
    pub fn filters(&self) -> Vec<(&str, &str)> {
        self.parts
            .iter()
            .map(|(f, v)| (f.as_str(), v.as_str()))
            .collect()
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for (i, (field, value)) in self.parts.iter().enumerate() {
            let sep = if i == 0 { ':' } else { ',' };
            write!(f, "{}{}={}", sep, field, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_order() {
        let mut kinds = EntityKind::ALL.to_vec();
        kinds.sort();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
        assert!(EntityKind::Site < EntityKind::Device);
        assert!(EntityKind::Interface < EntityKind::IpAddress);
    }

    #[test]
    fn test_global_kinds() {
        assert!(EntityKind::Site.is_global());
        assert!(EntityKind::Prefix.is_global());
        assert!(!EntityKind::Device.is_global());
        assert!(!EntityKind::Interface.is_global());
    }

    #[test]
    fn test_interface_key_prefers_default_name() {
        let device = RecordId::new("7");
        let key = NaturalKey::interface(&device, "uplink", Some("ether1"));
        assert_eq!(key.filters(), vec![("device", "7"), ("default_name", "ether1")]);

        let key = NaturalKey::interface(&device, "vlan10", None);
        assert_eq!(key.filters(), vec![("device", "7"), ("name", "vlan10")]);
    }

    #[test]
    fn test_key_display() {
        let key = NaturalKey::interface(&RecordId::new("7"), "uplink", Some("ether1"));
        assert_eq!(key.to_string(), "interface:device=7,default_name=ether1");
        assert_eq!(NaturalKey::site("hq").to_string(), "site:name=hq");
    }

    #[test]
    fn test_record_matches() {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!("hq"));
        fields.insert("status".into(), json!("active"));
        fields.insert("comments".into(), json!("unmanaged"));
        let record = Record {
            id: RecordId::new("1"),
            kind: EntityKind::Site,
            fields,
        };

        let mut desired = Fields::new();
        desired.insert("status".into(), json!("active"));
        assert!(record.matches(&desired));

        desired.insert("role".into(), Value::Null);
        assert!(record.matches(&desired));

        desired.insert("status".into(), json!("deprecated"));
        assert!(!record.matches(&desired));
    }
}
