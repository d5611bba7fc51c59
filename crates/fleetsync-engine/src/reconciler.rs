//! Create-or-update reconciliation of a single entity

use fleetsync_core::{Fields, NaturalKey, Record, RecordId};
use fleetsync_inventory::{Inventory, InventoryError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::dedup::{canonicalize, Canonical, DedupPolicy};
use crate::error::SyncError;
use crate::locks::KeyedLocks;
use crate::resolver::resolve;

/// What reconciliation did to the canonical record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Created,
    Updated,
    Unchanged,
}

/// Result of reconciling one natural key
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub record: Record,
    pub action: Action,
    /// Duplicates deleted while collapsing matches
    pub duplicates_removed: Vec<RecordId>,
    /// Duplicates left behind, with the delete failure
    pub dedup_failures: Vec<(RecordId, String)>,
}

impl Reconciled {
    fn new(record: Record, action: Action) -> Self {
        Self {
            record,
            action,
            duplicates_removed: Vec::new(),
            dedup_failures: Vec::new(),
        }
    }

    fn with_dedup(mut self, canonical: Canonical) -> Self {
        self.duplicates_removed.extend(canonical.removed);
        self.dedup_failures.extend(canonical.failed);
        self
    }

    pub fn id(&self) -> &RecordId {
        &self.record.id
    }
}

/// Drives resolve, dedup, and create-or-update against one inventory.
///
/// Reconciliation of global keys (see `EntityKind::is_global`) runs under a
/// per-key lock shared by every clone of the reconciler's `KeyedLocks`.
pub struct Reconciler {
    inventory: Arc<dyn Inventory>,
    locks: KeyedLocks,
    policy: DedupPolicy,
}

impl Reconciler {
    pub fn new(inventory: Arc<dyn Inventory>, locks: KeyedLocks, policy: DedupPolicy) -> Self {
        Self {
            inventory,
            locks,
            policy,
        }
    }

    pub fn inventory(&self) -> &dyn Inventory {
        self.inventory.as_ref()
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Converge the record for `key` to `desired`.
    ///
    /// `desired` is the full managed field set, natural-key fields included.
    /// Fields it does not name are never touched. An existing record that
    /// already matches is left alone and reported as unchanged.
    pub async fn reconcile(&self, key: &NaturalKey, desired: &Fields) -> Result<Reconciled, SyncError> {
        let _guard = if key.kind.is_global() {
            Some(self.locks.lock(key).await)
        } else {
            None
        };

        let matches = resolve(self.inventory(), key).await?;
        match canonicalize(self.inventory(), matches, self.policy).await {
            Some(canonical) => self.converge(key, canonical, desired).await,
            None => self.create(key, desired).await,
        }
    }

    async fn create(&self, key: &NaturalKey, desired: &Fields) -> Result<Reconciled, SyncError> {
        match self.inventory.create(key.kind, desired).await {
            Ok(record) => {
                info!(key = %key, id = %record.id, "Created record");
                Ok(Reconciled::new(record, Action::Created))
            }
            Err(InventoryError::Conflict { kind, message }) => {
                // Someone else holds the key; adopt their record instead
                debug!(key = %key, reason = %message, "Create conflicted, re-resolving");
                let matches = resolve(self.inventory(), key).await?;
                match canonicalize(self.inventory(), matches, self.policy).await {
                    Some(canonical) => self.update(key, canonical, desired).await,
                    None => Err(InventoryError::Conflict { kind, message }.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn converge(
        &self,
        key: &NaturalKey,
        canonical: Canonical,
        desired: &Fields,
    ) -> Result<Reconciled, SyncError> {
        if canonical.record.matches(desired) {
            debug!(key = %key, id = %canonical.record.id, "Record already up to date");
            let record = canonical.record.clone();
            return Ok(Reconciled::new(record, Action::Unchanged).with_dedup(canonical));
        }
        self.update(key, canonical, desired).await
    }

    async fn update(
        &self,
        key: &NaturalKey,
        canonical: Canonical,
        desired: &Fields,
    ) -> Result<Reconciled, SyncError> {
        match self.inventory.update(&canonical.record, desired).await {
            Ok(record) => {
                info!(key = %key, id = %record.id, "Updated record");
                Ok(Reconciled::new(record, Action::Updated).with_dedup(canonical))
            }
            Err(InventoryError::NotFound { .. }) => {
                // Deleted between resolve and update; recreate once
                debug!(key = %key, id = %canonical.record.id, "Record vanished, recreating");
                let record = self.inventory.create(key.kind, desired).await?;
                info!(key = %key, id = %record.id, "Created record");
                Ok(Reconciled::new(record, Action::Created).with_dedup(canonical))
            }
            Err(e) => Err(e.into()),
        }
    }
}
