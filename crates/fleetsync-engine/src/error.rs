//! Engine error types

use fleetsync_core::{EntityKind, FactsError};
use fleetsync_inventory::InventoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
    #[error("Cannot reconcile {kind}: required {missing} has not been reconciled")]
    MissingDependency {
        kind: EntityKind,
        missing: EntityKind,
    },
    #[error("Interface '{interface}' not found on device {device}")]
    InterfaceNotFound { device: String, interface: String },
    #[error("Invalid facts: {0}")]
    Facts(#[from] FactsError),
}

impl SyncError {
    /// Fatal errors stop the rest of the device's pipeline: the inventory
    /// stayed unreachable after retries, so later stages cannot succeed either
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Inventory(e) => e.is_transient(),
            Self::Facts(_) => true,
            Self::MissingDependency { .. } | Self::InterfaceNotFound { .. } => false,
        }
    }
}
