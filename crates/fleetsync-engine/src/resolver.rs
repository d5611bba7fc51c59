//! Natural-key resolution against the inventory

use fleetsync_core::{NaturalKey, Record};
use fleetsync_inventory::{Inventory, InventoryResult};
use tracing::trace;

/// All records matching `key`, in the order the inventory returned them
pub async fn resolve(inventory: &dyn Inventory, key: &NaturalKey) -> InventoryResult<Vec<Record>> {
    let matches = inventory.filter(key.kind, &key.filters()).await?;
    trace!(key = %key, matches = matches.len(), "Resolved natural key");
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core::{EntityKind, Fields, RecordId};
    use fleetsync_inventory::MemoryInventory;
    use serde_json::json;

    fn interface(device: &str, name: &str, default_name: Option<&str>) -> Fields {
        let mut fields = Fields::new();
        fields.insert("device".into(), json!(device));
        fields.insert("name".into(), json!(name));
        fields.insert("default_name".into(), json!(default_name));
        fields
    }

    #[tokio::test]
    async fn test_resolve_is_scoped_and_ordered() {
        let inventory = MemoryInventory::new();
        let first = inventory
            .seed(EntityKind::Interface, interface("1", "uplink", Some("ether1")))
            .await;
        inventory
            .seed(EntityKind::Interface, interface("2", "uplink", Some("ether1")))
            .await;
        let dup = inventory
            .seed(EntityKind::Interface, interface("1", "wan", Some("ether1")))
            .await;

        let key = NaturalKey::interface(&RecordId::new("1"), "renamed", Some("ether1"));
        let matches = resolve(&inventory, &key).await.unwrap();
        assert_eq!(matches, vec![first, dup]);
        assert!(inventory.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_by_name_without_default_name() {
        let inventory = MemoryInventory::new();
        let vlan = inventory
            .seed(EntityKind::Interface, interface("1", "vlan10", None))
            .await;
        let key = NaturalKey::interface(&RecordId::new("1"), "vlan10", None);
        assert_eq!(resolve(&inventory, &key).await.unwrap(), vec![vlan]);
    }
}
