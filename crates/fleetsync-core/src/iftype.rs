//! Vendor interface attributes to inventory interface types

use serde::{Deserialize, Serialize};

/// Interface type taxonomy understood by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceType {
    #[serde(rename = "virtual")]
    Virtual,
    #[serde(rename = "1000base-t")]
    Base1000T,
    #[serde(rename = "10gbase-x-sfpp")]
    Base10GSfpPlus,
    #[serde(rename = "1000base-x-sfp")]
    Base1000Sfp,
    #[serde(rename = "other")]
    Other,
}

impl InterfaceType {
    /// Inventory slug for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Virtual => "virtual",
            Self::Base1000T => "1000base-t",
            Self::Base10GSfpPlus => "10gbase-x-sfpp",
            Self::Base1000Sfp => "1000base-x-sfp",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an interface kind tag and optional vendor default name to a type.
///
/// Rules are checked in order and the first match wins. `sfpplus` must be
/// tested before `sfp` since every `sfpplus` name also contains `sfp`.
pub fn translate_interface_type(kind: &str, default_name: Option<&str>) -> InterfaceType {
    match kind {
        "vlan" | "bridge" => return InterfaceType::Virtual,
        _ => {}
    }

    match default_name {
        Some(name) if name.contains("ether") => InterfaceType::Base1000T,
        Some(name) if name.contains("sfpplus") => InterfaceType::Base10GSfpPlus,
        Some(name) if name.contains("sfp") => InterfaceType::Base1000Sfp,
        _ => InterfaceType::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_kinds() {
        assert_eq!(translate_interface_type("vlan", None), InterfaceType::Virtual);
        assert_eq!(translate_interface_type("bridge", None), InterfaceType::Virtual);
        // Kind wins over the default name
        assert_eq!(
            translate_interface_type("vlan", Some("ether1")),
            InterfaceType::Virtual
        );
    }

    #[test]
    fn test_default_name_rules() {
        assert_eq!(
            translate_interface_type("ether", Some("ether1")),
            InterfaceType::Base1000T
        );
        assert_eq!(
            translate_interface_type("ether", Some("sfp-sfpplus1")),
            InterfaceType::Base10GSfpPlus
        );
        assert_eq!(
            translate_interface_type("ether", Some("sfp1")),
            InterfaceType::Base1000Sfp
        );
    }

    #[test]
    fn test_fallback_to_other() {
        assert_eq!(translate_interface_type("", None), InterfaceType::Other);
        assert_eq!(translate_interface_type("wlan", Some("wlan1")), InterfaceType::Other);
    }

    #[test]
    fn test_serialized_slug() {
        let json = serde_json::to_string(&InterfaceType::Base10GSfpPlus).unwrap();
        assert_eq!(json, "\"10gbase-x-sfpp\"");
        assert_eq!(InterfaceType::Base1000T.to_string(), "1000base-t");
    }
}
