//! In-memory inventory for tests and dry runs
//!
//! Records are kept in insertion order so `filter` returns matches the way a
//! backend listing would. Every call is recorded for inspection, failures can
//! be injected per operation, and each operation yields to the scheduler
//! before touching state so concurrent callers interleave.

use async_trait::async_trait;
use fleetsync_core::{EntityKind, Fields, Record, RecordId};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

use crate::client::{Inventory, InventoryError, InventoryResult};

/// Inventory operation, used for call recording and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Filter,
    Create,
    Update,
    Delete,
}

/// A recorded inventory call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Operation,
    pub kind: EntityKind,
    /// Target record for update/delete
    pub id: Option<RecordId>,
    /// Fields sent with create/update
    pub fields: Option<Fields>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Record>,
    next_id: u64,
    /// Field sets that must be unique per kind
    unique: HashMap<EntityKind, Vec<Vec<String>>>,
    failures: VecDeque<(Operation, InventoryError)>,
    calls: Vec<Call>,
}

impl MemoryState {
    fn take_failure(&mut self, op: Operation) -> Option<InventoryError> {
        let pos = self.failures.iter().position(|(o, _)| *o == op)?;
        self.failures.remove(pos).map(|(_, e)| e)
    }

    fn conflicting(&self, kind: EntityKind, fields: &Fields) -> Option<String> {
        let constraints = self.unique.get(&kind)?;
        for constraint in constraints {
            let clash = self.records.iter().any(|r| {
                r.kind == kind
                    && constraint
                        .iter()
                        .all(|f| fields.get(f).is_some() && r.fields.get(f) == fields.get(f))
            });
            if clash {
                return Some(format!("{} with this {} already exists", kind, constraint.join(", ")));
            }
        }
        None
    }
}

/// Inventory held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryInventory {
    state: Mutex<MemoryState>,
    /// Artificial delay per operation; zero means a plain scheduler yield
    latency: Duration,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before each operation
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject creates that repeat the values of `fields` for `kind`
    pub fn with_unique(mut self, kind: EntityKind, fields: &[&str]) -> Self {
        self.state
            .get_mut()
            .unique
            .entry(kind)
            .or_default()
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Insert a record directly, bypassing constraints and call recording
    pub async fn seed(&self, kind: EntityKind, fields: Fields) -> Record {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let record = Record {
            id: RecordId(state.next_id.to_string()),
            kind,
            fields,
        };
        state.records.push(record.clone());
        record
    }

    /// Make the next `op` fail with `error`
    pub async fn fail_next(&self, op: Operation, error: InventoryError) {
        self.state.lock().await.failures.push_back((op, error));
    }

    /// All records of a kind, in insertion order
    pub async fn records(&self, kind: EntityKind) -> Vec<Record> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    /// Every call made so far
    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    /// Calls that wrote to the inventory (create, update, delete)
    pub async fn writes(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| c.op != Operation::Filter)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    async fn interleave(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn field_matches(record: &Record, field: &str, value: &str) -> bool {
    match record.fields.get(field) {
        Some(Value::String(s)) => s == value,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == value,
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn filter(
        &self,
        kind: EntityKind,
        filters: &[(&str, &str)],
    ) -> InventoryResult<Vec<Record>> {
        self.interleave().await;
        let mut state = self.state.lock().await;
        state.calls.push(Call {
            op: Operation::Filter,
            kind,
            id: None,
            fields: None,
        });
        if let Some(e) = state.take_failure(Operation::Filter) {
            return Err(e);
        }

        let matches: Vec<Record> = state
            .records
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| filters.iter().all(|(f, v)| field_matches(r, f, v)))
            .cloned()
            .collect();
        trace!(kind = %kind, matches = matches.len(), "Memory filter");
        Ok(matches)
    }

    async fn create(&self, kind: EntityKind, fields: &Fields) -> InventoryResult<Record> {
        self.interleave().await;
        let mut state = self.state.lock().await;
        state.calls.push(Call {
            op: Operation::Create,
            kind,
            id: None,
            fields: Some(fields.clone()),
        });
        if let Some(e) = state.take_failure(Operation::Create) {
            return Err(e);
        }
        if let Some(message) = state.conflicting(kind, fields) {
            return Err(InventoryError::Conflict { kind, message });
        }

        state.next_id += 1;
        let record = Record {
            id: RecordId(state.next_id.to_string()),
            kind,
            fields: fields.clone(),
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, record: &Record, fields: &Fields) -> InventoryResult<Record> {
        self.interleave().await;
        let mut state = self.state.lock().await;
        state.calls.push(Call {
            op: Operation::Update,
            kind: record.kind,
            id: Some(record.id.clone()),
            fields: Some(fields.clone()),
        });
        if let Some(e) = state.take_failure(Operation::Update) {
            return Err(e);
        }

        let stored = state
            .records
            .iter_mut()
            .find(|r| r.kind == record.kind && r.id == record.id)
            .ok_or_else(|| InventoryError::NotFound {
                kind: record.kind,
                id: record.id.clone(),
            })?;
        for (field, value) in fields {
            stored.fields.insert(field.clone(), value.clone());
        }
        Ok(stored.clone())
    }

    async fn delete(&self, record: &Record) -> InventoryResult<()> {
        self.interleave().await;
        let mut state = self.state.lock().await;
        state.calls.push(Call {
            op: Operation::Delete,
            kind: record.kind,
            id: Some(record.id.clone()),
            fields: None,
        });
        if let Some(e) = state.take_failure(Operation::Delete) {
            return Err(e);
        }

        let pos = state
            .records
            .iter()
            .position(|r| r.kind == record.kind && r.id == record.id)
            .ok_or_else(|| InventoryError::NotFound {
                kind: record.kind,
                id: record.id.clone(),
            })?;
        state.records.remove(pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_filter_update_delete() {
        let inventory = MemoryInventory::new();
        let site = inventory
            .create(EntityKind::Site, &fields(&[("name", json!("hq")), ("status", json!("active"))]))
            .await
            .unwrap();
        assert_eq!(site.id.as_str(), "1");

        let found = inventory.filter(EntityKind::Site, &[("name", "hq")]).await.unwrap();
        assert_eq!(found, vec![site.clone()]);
        assert!(inventory
            .filter(EntityKind::Device, &[("name", "hq")])
            .await
            .unwrap()
            .is_empty());

        let updated = inventory
            .update(&site, &fields(&[("status", json!("deprecated"))]))
            .await
            .unwrap();
        assert_eq!(updated.get_str("status"), Some("deprecated"));
        assert_eq!(updated.get_str("name"), Some("hq"));

        inventory.delete(&site).await.unwrap();
        assert!(matches!(
            inventory.delete(&site).await,
            Err(InventoryError::NotFound { .. })
        ));
        assert!(matches!(
            inventory.update(&site, &Fields::new()).await,
            Err(InventoryError::NotFound { .. })
        ));
        assert_eq!(inventory.writes().await.len(), 5);
    }

    #[tokio::test]
    async fn test_unique_constraint_conflicts() {
        let inventory = MemoryInventory::new().with_unique(EntityKind::Site, &["name"]);
        let hq = fields(&[("name", json!("hq"))]);
        inventory.create(EntityKind::Site, &hq).await.unwrap();
        let err = inventory.create(EntityKind::Site, &hq).await.unwrap_err();
        assert!(matches!(err, InventoryError::Conflict { kind: EntityKind::Site, .. }));

        // Seeding bypasses constraints so duplicates can be staged
        inventory.seed(EntityKind::Site, hq.clone()).await;
        assert_eq!(inventory.records(EntityKind::Site).await.len(), 2);
    }

    #[tokio::test]
    async fn test_null_fields_never_match() {
        let inventory = MemoryInventory::new();
        inventory
            .seed(EntityKind::Interface, fields(&[("name", json!("ether1")), ("default_name", Value::Null)]))
            .await;
        assert!(inventory
            .filter(EntityKind::Interface, &[("default_name", "")])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let inventory = MemoryInventory::new();
        inventory
            .fail_next(Operation::Create, InventoryError::Transport("down".into()))
            .await;
        let hq = fields(&[("name", json!("hq"))]);
        assert!(inventory.create(EntityKind::Site, &hq).await.is_err());
        assert!(inventory.create(EntityKind::Site, &hq).await.is_ok());
    }
}
