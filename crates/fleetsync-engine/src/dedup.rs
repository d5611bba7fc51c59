//! Duplicate collapse: one canonical record per natural key
//!
//! When a natural key matches more than one record, one is kept and the rest
//! are deleted. Whichever record is kept, at most one remains afterwards, so
//! repeated runs converge. Delete failures are reported, not raised; the next
//! sync retries them.

use fleetsync_core::{Record, RecordId};
use fleetsync_inventory::{Inventory, InventoryError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{info, warn};

/// Which duplicate survives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// First record in backend order
    #[default]
    First,
    /// Lowest identifier; stable across backends that reorder listings
    LowestId,
}

/// The surviving record and what happened to its duplicates
#[derive(Debug, Clone, PartialEq)]
pub struct Canonical {
    pub record: Record,
    /// Duplicates deleted (or already gone)
    pub removed: Vec<RecordId>,
    /// Duplicates that could not be deleted, with the reason
    pub failed: Vec<(RecordId, String)>,
}

/// Numeric ids compare numerically, anything else lexicographically
fn compare_ids(a: &RecordId, b: &RecordId) -> Ordering {
    match (a.as_str().parse::<u64>(), b.as_str().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// Collapse `matches` to a single record, deleting the others.
///
/// Returns `None` when there is nothing to collapse (the caller creates).
pub async fn canonicalize(
    inventory: &dyn Inventory,
    mut matches: Vec<Record>,
    policy: DedupPolicy,
) -> Option<Canonical> {
    if matches.is_empty() {
        return None;
    }

    let keep = match policy {
        DedupPolicy::First => 0,
        DedupPolicy::LowestId => matches
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| compare_ids(&a.id, &b.id))
            .map(|(i, _)| i)
            .unwrap_or(0),
    };
    let record = matches.remove(keep);

    let mut removed = Vec::new();
    let mut failed = Vec::new();
    for duplicate in matches {
        match inventory.delete(&duplicate).await {
            Ok(()) | Err(InventoryError::NotFound { .. }) => {
                info!(
                    kind = %duplicate.kind,
                    kept = %record.id,
                    removed = %duplicate.id,
                    "Removed duplicate record"
                );
                removed.push(duplicate.id);
            }
            Err(e) => {
                warn!(
                    kind = %duplicate.kind,
                    id = %duplicate.id,
                    error = %e,
                    "Failed to remove duplicate record"
                );
                failed.push((duplicate.id, e.to_string()));
            }
        }
    }

    Some(Canonical {
        record,
        removed,
        failed,
    })
}
