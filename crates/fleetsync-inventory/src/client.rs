//! Inventory capability set and error taxonomy

use async_trait::async_trait;
use fleetsync_core::{EntityKind, Fields, Record, RecordId};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InventoryError {
    #[error("{kind} record {id} not found")]
    NotFound { kind: EntityKind, id: RecordId },
    #[error("Conflict creating {kind}: {message}")]
    Conflict { kind: EntityKind, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl InventoryError {
    /// Transport failures may succeed on retry; every other error is a
    /// definitive answer from the inventory
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;

/// Operations the reconciliation engine needs from an inventory
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Records of `kind` whose fields equal every filter value, in backend order
    async fn filter(&self, kind: EntityKind, filters: &[(&str, &str)])
        -> InventoryResult<Vec<Record>>;

    /// Create a record; fails with `Conflict` on a uniqueness collision
    async fn create(&self, kind: EntityKind, fields: &Fields) -> InventoryResult<Record>;

    /// Overwrite the given keys on a record; fails with `NotFound` if it is gone
    async fn update(&self, record: &Record, fields: &Fields) -> InventoryResult<Record>;

    /// Delete a record; fails with `NotFound` if it is already gone
    async fn delete(&self, record: &Record) -> InventoryResult<()>;
}

#[async_trait]
impl<T: Inventory + ?Sized> Inventory for Arc<T> {
    async fn filter(
        &self,
        kind: EntityKind,
        filters: &[(&str, &str)],
    ) -> InventoryResult<Vec<Record>> {
        (**self).filter(kind, filters).await
    }

    async fn create(&self, kind: EntityKind, fields: &Fields) -> InventoryResult<Record> {
        (**self).create(kind, fields).await
    }

    async fn update(&self, record: &Record, fields: &Fields) -> InventoryResult<Record> {
        (**self).update(record, fields).await
    }

    async fn delete(&self, record: &Record) -> InventoryResult<()> {
        (**self).delete(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_transient() {
        assert!(InventoryError::Transport("timed out".into()).is_transient());
        assert!(!InventoryError::Conflict {
            kind: EntityKind::Site,
            message: "exists".into()
        }
        .is_transient());
        assert!(!InventoryError::NotFound {
            kind: EntityKind::Device,
            id: RecordId::new("1")
        }
        .is_transient());
        assert!(!InventoryError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
    }
}
