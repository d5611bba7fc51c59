//! Desired record state derived from facts
//!
//! Each builder returns the natural key and the full managed field set for
//! one entity. Reference fields carry the referenced record's id.

use fleetsync_core::{Cidr, Fields, InterfaceFact, IpFact, NaturalKey, RecordId, Status};
use serde_json::{json, Value};

fn fields(pairs: Vec<(&str, Value)>) -> Fields {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn site(name: &str) -> (NaturalKey, Fields) {
    (
        NaturalKey::site(name),
        fields(vec![("name", json!(name)), ("status", json!(Status::Active))]),
    )
}

pub fn device_type(model: &str, manufacturer: &str) -> (NaturalKey, Fields) {
    (
        NaturalKey::device_type(model),
        fields(vec![("model", json!(model)), ("manufacturer", json!(manufacturer))]),
    )
}

pub struct DeviceInput<'a> {
    pub name: &'a str,
    pub role: &'a str,
    pub serial: &'a str,
    pub site: &'a RecordId,
    pub device_type: &'a RecordId,
}

pub fn device(input: &DeviceInput<'_>) -> (NaturalKey, Fields) {
    (
        NaturalKey::device(input.name),
        fields(vec![
            ("name", json!(input.name)),
            ("device_type", Value::from(input.device_type)),
            ("site", Value::from(input.site)),
            ("role", json!(input.role)),
            ("serial", json!(input.serial)),
            ("status", json!(Status::Active)),
        ]),
    )
}

pub fn interface(device: &RecordId, iface: &InterfaceFact) -> (NaturalKey, Fields) {
    (
        NaturalKey::interface(device, &iface.name, iface.default_name.as_deref()),
        fields(vec![
            ("device", Value::from(device)),
            ("name", json!(iface.name)),
            ("type", json!(iface.interface_type())),
            ("description", json!(iface.description)),
            ("mac_address", json!(iface.mac_address)),
            ("default_name", json!(iface.default_name)),
            ("status", json!(Status::Active)),
        ]),
    )
}

pub fn prefix(prefix: &Cidr, status: Status) -> (NaturalKey, Fields) {
    (
        NaturalKey::prefix(prefix),
        fields(vec![("prefix", json!(prefix)), ("status", json!(status))]),
    )
}

pub fn ip_address(ip: &IpFact, interface: &RecordId) -> (NaturalKey, Fields) {
    (
        NaturalKey::ip_address(&ip.address),
        fields(vec![
            ("address", json!(ip.address)),
            ("status", json!(ip.status())),
            ("description", json!(ip.description)),
            ("role", json!(ip.role())),
            ("assigned_interface", Value::from(interface)),
        ]),
    )
}
