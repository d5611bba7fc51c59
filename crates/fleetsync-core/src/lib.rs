//! Fleetsync Core - Fact bundles, entity model, and pure derivations
//!
//! This crate provides the foundational types for the fleetsync system:
//! - Fact bundles describing one device's discovered state
//! - Inventory entity kinds, records, and natural keys
//! - Address derivations (prefix membership, role, status)
//! - Vendor interface type translation

pub mod addressing;
pub mod entity;
pub mod facts;
pub mod iftype;

pub use addressing::{ip_role, status_from_disabled, AddressError, Cidr, IpRole};
pub use entity::{EntityKind, Fields, NaturalKey, Record, RecordId, Status};
pub use facts::{FactBundle, FactsError, InterfaceFact, IpFact, RawFacts};
pub use iftype::{translate_interface_type, InterfaceType};
