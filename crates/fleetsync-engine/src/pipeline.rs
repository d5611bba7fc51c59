//! Ordered per-device sync pipeline
//!
//! Stages run in [`EntityKind::ALL`] order and thread record ids forward:
//! the device consumes the site and device type, interfaces consume the
//! device, and IP addresses consume interfaces. Entity failures are recorded
//! and the stage moves on. A fatal error (the inventory stayed unreachable) or
//! a device that could not be reconciled aborts the device: every remaining
//! entity is recorded as skipped.

use fleetsync_core::{Cidr, EntityKind, FactBundle, IpFact, NaturalKey, RecordId, Status};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::desired::{self, DeviceInput};
use crate::error::SyncError;
use crate::reconciler::{Reconciled, Reconciler};
use crate::report::{DeviceReport, EntityOutcome};

fn default_manufacturer() -> String {
    "MikroTik".to_string()
}

/// Run-wide settings applied to every device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Manufacturer recorded on device types
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,
    /// Reconciling against a preview inventory
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            manufacturer: default_manufacturer(),
            dry_run: false,
        }
    }
}

/// Ids reconciled so far for one device
#[derive(Debug, Default)]
struct StageIds {
    site: Option<RecordId>,
    device_type: Option<RecordId>,
    device: Option<RecordId>,
    /// Interface display name -> id
    interfaces: HashMap<String, RecordId>,
}

/// One prefix per network, active when any address on it is enabled
fn prefixes(facts: &FactBundle) -> Vec<(Cidr, Status)> {
    let mut prefixes: Vec<(Cidr, Status)> = Vec::new();
    for ip in &facts.ip_addresses {
        let status = ip.status();
        match prefixes.iter_mut().find(|(p, _)| *p == ip.prefix) {
            Some((_, existing)) => {
                if status == Status::Active {
                    *existing = Status::Active;
                }
            }
            None => prefixes.push((ip.prefix, status)),
        }
    }
    prefixes
}

/// Keys (or, before the device exists, labels) of every entity in a stage
fn stage_labels(kind: EntityKind, facts: &FactBundle) -> Vec<String> {
    match kind {
        EntityKind::Site => vec![NaturalKey::site(&facts.site).to_string()],
        EntityKind::DeviceType => vec![NaturalKey::device_type(&facts.model).to_string()],
        EntityKind::Device => vec![NaturalKey::device(&facts.name).to_string()],
        EntityKind::Interface => facts
            .interfaces
            .iter()
            .map(|i| format!("interface:name={}", i.name))
            .collect(),
        EntityKind::Prefix => prefixes(facts)
            .iter()
            .map(|(p, _)| NaturalKey::prefix(p).to_string())
            .collect(),
        EntityKind::IpAddress => facts
            .ip_addresses
            .iter()
            .map(|ip| NaturalKey::ip_address(&ip.address).to_string())
            .collect(),
    }
}

/// Syncs one device's facts through every stage
pub struct DevicePipeline<'a> {
    reconciler: &'a Reconciler,
    options: &'a SyncOptions,
}

impl<'a> DevicePipeline<'a> {
    pub fn new(reconciler: &'a Reconciler, options: &'a SyncOptions) -> Self {
        Self {
            reconciler,
            options,
        }
    }

    /// Run all stages for `facts`; never fails, problems land in the report
    pub async fn run(&self, facts: &FactBundle) -> DeviceReport {
        let major_version = facts.major_version();
        info!(
            device = %facts.name,
            site = %facts.site,
            version = major_version.unwrap_or("unknown"),
            "Syncing device"
        );
        let mut report = DeviceReport::new(&facts.name);
        report.major_version = major_version.map(str::to_string);
        let mut ids = StageIds::default();
        let mut aborted: Option<String> = None;

        for kind in EntityKind::ALL {
            if let Some(reason) = &aborted {
                for label in stage_labels(kind, facts) {
                    report.push(EntityOutcome::skipped(kind, label, reason));
                }
                continue;
            }

            let result = match kind {
                EntityKind::Site => self.site_stage(facts, &mut ids, &mut report).await,
                EntityKind::DeviceType => self.device_type_stage(facts, &mut ids, &mut report).await,
                EntityKind::Device => self.device_stage(facts, &mut ids, &mut report).await,
                EntityKind::Interface => self.interface_stage(facts, &mut ids, &mut report).await,
                EntityKind::Prefix => self.prefix_stage(facts, &mut report).await,
                EntityKind::IpAddress => self.ip_stage(facts, &ids, &mut report).await,
            };

            if let Err(e) = result {
                error!(device = %facts.name, stage = %kind, error = %e, "Device sync aborted");
                report.abort(&e);
                aborted = Some(format!("{} stage aborted: {}", kind, e));
            }
        }

        let report = report.finish();
        info!(device = %facts.name, status = %report.status, "Device sync finished");
        report
    }

    /// Reconcile the device record itself.
    ///
    /// Fails with a dependency error, without touching the inventory, when
    /// the site or device type has not been reconciled.
    pub async fn reconcile_device(
        &self,
        facts: &FactBundle,
        site: Option<&RecordId>,
        device_type: Option<&RecordId>,
    ) -> Result<Reconciled, SyncError> {
        let missing = |missing| SyncError::MissingDependency {
            kind: EntityKind::Device,
            missing,
        };
        let site = site.ok_or_else(|| missing(EntityKind::Site))?;
        let device_type = device_type.ok_or_else(|| missing(EntityKind::DeviceType))?;

        let (key, fields) = desired::device(&DeviceInput {
            name: &facts.name,
            role: &facts.role,
            serial: &facts.serial,
            site,
            device_type,
        });
        self.reconciler.reconcile(&key, &fields).await
    }

    /// Push the outcome for `key`; returns the id on success, `None` on an
    /// entity failure, and the error itself when it is fatal
    fn record(
        &self,
        report: &mut DeviceReport,
        key: &NaturalKey,
        result: Result<Reconciled, SyncError>,
    ) -> Result<Option<RecordId>, SyncError> {
        match result {
            Ok(reconciled) => {
                report.push(EntityOutcome::reconciled(key, &reconciled));
                Ok(Some(reconciled.record.id))
            }
            Err(e) => {
                warn!(device = %report.device, key = %key, error = %e, "Entity sync failed");
                report.push(EntityOutcome::failed(key, &e));
                if e.is_fatal() {
                    Err(e)
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn site_stage(
        &self,
        facts: &FactBundle,
        ids: &mut StageIds,
        report: &mut DeviceReport,
    ) -> Result<(), SyncError> {
        let (key, fields) = desired::site(&facts.site);
        let result = self.reconciler.reconcile(&key, &fields).await;
        ids.site = self.record(report, &key, result)?;
        Ok(())
    }

    async fn device_type_stage(
        &self,
        facts: &FactBundle,
        ids: &mut StageIds,
        report: &mut DeviceReport,
    ) -> Result<(), SyncError> {
        let (key, fields) = desired::device_type(&facts.model, &self.options.manufacturer);
        let result = self.reconciler.reconcile(&key, &fields).await;
        ids.device_type = self.record(report, &key, result)?;
        Ok(())
    }

    async fn device_stage(
        &self,
        facts: &FactBundle,
        ids: &mut StageIds,
        report: &mut DeviceReport,
    ) -> Result<(), SyncError> {
        let key = NaturalKey::device(&facts.name);
        let result = self
            .reconcile_device(facts, ids.site.as_ref(), ids.device_type.as_ref())
            .await;
        match result {
            Ok(reconciled) => {
                ids.device = self.record(report, &key, Ok(reconciled))?;
                Ok(())
            }
            Err(e) => {
                warn!(device = %facts.name, error = %e, "Device not reconciled");
                report.push(EntityOutcome::failed(&key, &e));
                // Nothing downstream can reference a device that does not exist
                Err(e)
            }
        }
    }

    async fn interface_stage(
        &self,
        facts: &FactBundle,
        ids: &mut StageIds,
        report: &mut DeviceReport,
    ) -> Result<(), SyncError> {
        let Some(device) = ids.device.clone() else {
            return Err(SyncError::MissingDependency {
                kind: EntityKind::Interface,
                missing: EntityKind::Device,
            });
        };

        let mut pending = facts.interfaces.iter();
        while let Some(iface) = pending.next() {
            let (key, fields) = desired::interface(&device, iface);
            let result = self.reconciler.reconcile(&key, &fields).await;
            match self.record(report, &key, result) {
                Ok(Some(id)) => {
                    ids.interfaces.insert(iface.name.clone(), id);
                }
                Ok(None) => {}
                Err(e) => {
                    for rest in pending {
                        let key = NaturalKey::interface(&device, &rest.name, rest.default_name.as_deref());
                        report.push(EntityOutcome::skipped(EntityKind::Interface, key, &e));
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn prefix_stage(&self, facts: &FactBundle, report: &mut DeviceReport) -> Result<(), SyncError> {
        let prefixes = prefixes(facts);
        let mut pending = prefixes.iter();
        while let Some((prefix, status)) = pending.next() {
            let (key, fields) = desired::prefix(prefix, *status);
            let result = self.reconciler.reconcile(&key, &fields).await;
            if let Err(e) = self.record(report, &key, result) {
                for (rest, _) in pending {
                    report.push(EntityOutcome::skipped(EntityKind::Prefix, NaturalKey::prefix(rest), &e));
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn ip_stage(
        &self,
        facts: &FactBundle,
        ids: &StageIds,
        report: &mut DeviceReport,
    ) -> Result<(), SyncError> {
        let Some(device) = ids.device.as_ref() else {
            return Err(SyncError::MissingDependency {
                kind: EntityKind::IpAddress,
                missing: EntityKind::Device,
            });
        };

        let mut pending = facts.ip_addresses.iter();
        while let Some(ip) = pending.next() {
            let key = NaturalKey::ip_address(&ip.address);
            let result = self.assign_ip(facts, device, ids, ip).await;
            if let Err(e) = self.record(report, &key, result) {
                for rest in pending {
                    report.push(EntityOutcome::skipped(
                        EntityKind::IpAddress,
                        NaturalKey::ip_address(&rest.address),
                        &e,
                    ));
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn assign_ip(
        &self,
        facts: &FactBundle,
        device: &RecordId,
        ids: &StageIds,
        ip: &IpFact,
    ) -> Result<Reconciled, SyncError> {
        let interface = self.lookup_interface(facts, device, ids, &ip.interface).await?;
        let (key, fields) = desired::ip_address(ip, &interface);
        self.reconciler.reconcile(&key, &fields).await
    }

    /// Interfaces reconciled in this run first, then the inventory
    async fn lookup_interface(
        &self,
        facts: &FactBundle,
        device: &RecordId,
        ids: &StageIds,
        name: &str,
    ) -> Result<RecordId, SyncError> {
        if let Some(id) = ids.interfaces.get(name) {
            return Ok(id.clone());
        }

        let found = self
            .reconciler
            .inventory()
            .filter(EntityKind::Interface, &[("device", device.as_str()), ("name", name)])
            .await?;
        match found.into_iter().next() {
            Some(record) => {
                debug!(device = %facts.name, interface = %name, id = %record.id, "Interface found in inventory");
                Ok(record.id)
            }
            None => Err(SyncError::InterfaceNotFound {
                device: facts.name.clone(),
                interface: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupPolicy;
    use crate::locks::KeyedLocks;
    use crate::report::{DeviceSyncStatus, Outcome};
    use fleetsync_core::Fields;
    use fleetsync_inventory::{Inventory, InventoryError, MemoryInventory, Operation};
    use serde_json::json;
    use std::sync::Arc;

    const FACTS: &str = r#"{
        "name": "hq-router1",
        "serial-number": "HG90A1B2C3",
        "board-name": "RB5009UG+S+",
        "version": "7.12.1 (stable)",
        "interfaces": [
            {"name": "ether1", "mac-address": "48:A9:8A:00:00:01", "type": "ether", "default-name": "ether1"},
            {"name": "uplink", "mac-address": "48:A9:8A:00:00:02", "type": "ether", "default-name": "sfp-sfpplus1", "comment": "to core"},
            {"name": "vlan10", "type": "vlan"}
        ],
        "ip-addresses": [
            {"address": "10.0.0.1/32", "network": "10.0.0.1", "interface": "ether1", "disabled": "false"},
            {"address": "192.168.10.1/24", "network": "192.168.10.0", "interface": "vlan10", "disabled": "false"},
            {"address": "192.168.10.2/24", "network": "192.168.10.0", "interface": "vlan10", "disabled": "true"}
        ]
    }"#;

    fn facts() -> FactBundle {
        FactBundle::from_json(FACTS).unwrap()
    }

    fn setup() -> (Arc<MemoryInventory>, Reconciler) {
        let inventory = Arc::new(MemoryInventory::new());
        let reconciler = Reconciler::new(inventory.clone(), KeyedLocks::new(), DedupPolicy::First);
        (inventory, reconciler)
    }

    #[tokio::test]
    async fn test_full_sync_creates_everything() {
        let (inventory, reconciler) = setup();
        let options = SyncOptions::default();
        let report = DevicePipeline::new(&reconciler, &options).run(&facts()).await;

        assert_eq!(report.status, DeviceSyncStatus::Succeeded, "{:?}", report);
        assert_eq!(report.major_version.as_deref(), Some("7"));
        assert_eq!(inventory.records(EntityKind::Site).await.len(), 1);
        assert_eq!(inventory.records(EntityKind::Interface).await.len(), 3);
        assert_eq!(inventory.records(EntityKind::Prefix).await.len(), 2);
        assert_eq!(inventory.records(EntityKind::IpAddress).await.len(), 3);

        let device_type = &inventory.records(EntityKind::DeviceType).await[0];
        assert_eq!(device_type.get_str("manufacturer"), Some("MikroTik"));

        let device = &inventory.records(EntityKind::Device).await[0];
        assert_eq!(device.get_str("role"), Some("router"));
        let site = &inventory.records(EntityKind::Site).await[0];
        assert_eq!(device.get_str("site"), Some(site.id.as_str()));

        // Shared /24 is active because one of its addresses is enabled
        let lan = inventory
            .filter(EntityKind::Prefix, &[("prefix", "192.168.10.0/24")])
            .await
            .unwrap();
        assert_eq!(lan[0].get_str("status"), Some("active"));
    }

    #[tokio::test]
    async fn test_ip_bound_to_interface_from_this_run() {
        let (inventory, reconciler) = setup();
        let options = SyncOptions::default();
        DevicePipeline::new(&reconciler, &options).run(&facts()).await;

        let ether1 = inventory
            .filter(EntityKind::Interface, &[("name", "ether1")])
            .await
            .unwrap();
        let loopback = inventory
            .filter(EntityKind::IpAddress, &[("address", "10.0.0.1/32")])
            .await
            .unwrap();
        assert_eq!(loopback[0].fields["assigned_interface"], json!(ether1[0].id.as_str()));
        assert_eq!(loopback[0].get_str("role"), Some("loopback"));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let (inventory, reconciler) = setup();
        let options = SyncOptions::default();
        let pipeline = DevicePipeline::new(&reconciler, &options);
        pipeline.run(&facts()).await;

        inventory.clear_calls().await;
        let report = pipeline.run(&facts()).await;
        assert!(inventory.writes().await.is_empty());
        assert!(report
            .entities
            .iter()
            .all(|e| e.outcome == Outcome::Unchanged));
    }

    #[tokio::test]
    async fn test_device_before_site_fails_fast() {
        let (inventory, reconciler) = setup();
        let options = SyncOptions::default();
        let model = RecordId::new("1");
        let err = DevicePipeline::new(&reconciler, &options)
            .reconcile_device(&facts(), None, Some(&model))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::MissingDependency {
                kind: EntityKind::Device,
                missing: EntityKind::Site
            }
        ));
        assert!(inventory.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_site_aborts_device() {
        let (inventory, reconciler) = setup();
        inventory
            .fail_next(
                Operation::Create,
                InventoryError::Rejected {
                    status: 400,
                    message: "bad status".into(),
                },
            )
            .await;
        let options = SyncOptions::default();
        let report = DevicePipeline::new(&reconciler, &options).run(&facts()).await;

        assert_eq!(report.status, DeviceSyncStatus::Failed);
        let summary = report.summary();
        assert_eq!(summary[&EntityKind::Site].failed, 1);
        // Device type does not depend on the site
        assert_eq!(summary[&EntityKind::DeviceType].created, 1);
        assert_eq!(summary[&EntityKind::Device].failed, 1);
        assert_eq!(summary[&EntityKind::Interface].skipped, 3);
        assert_eq!(summary[&EntityKind::IpAddress].skipped, 3);
        assert!(inventory.records(EntityKind::Device).await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_skips_remaining_stages() {
        let (inventory, reconciler) = setup();
        let options = SyncOptions::default();
        let pipeline = DevicePipeline::new(&reconciler, &options);
        pipeline.run(&facts()).await;

        // Only the uplink changes, and its update cannot reach the inventory
        let mut facts = facts();
        facts.interfaces[1].description = "to core, rerouted".into();
        inventory
            .fail_next(Operation::Update, InventoryError::Transport("timed out".into()))
            .await;
        let report = pipeline.run(&facts).await;

        assert_eq!(report.status, DeviceSyncStatus::Failed);
        assert!(report.error.as_deref().unwrap_or_default().contains("timed out"));
        let summary = report.summary();
        assert_eq!(summary[&EntityKind::Interface].unchanged, 1);
        assert_eq!(summary[&EntityKind::Interface].failed, 1);
        assert_eq!(summary[&EntityKind::Interface].skipped, 1);
        assert_eq!(summary[&EntityKind::Prefix].skipped, 2);
        assert_eq!(summary[&EntityKind::IpAddress].skipped, 3);
    }

    #[tokio::test]
    async fn test_unknown_interface_fails_only_that_address() {
        let (inventory, reconciler) = setup();
        let options = SyncOptions::default();
        let mut facts = facts();
        facts.ip_addresses[1].interface = "bridge-missing".into();

        let report = DevicePipeline::new(&reconciler, &options).run(&facts).await;
        assert_eq!(report.status, DeviceSyncStatus::Partial);
        let failed: Vec<_> = report
            .outcomes(EntityKind::IpAddress)
            .filter(|e| e.outcome.is_failure())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key, "ip_address:address=192.168.10.1/24");
        assert!(matches!(&failed[0].outcome, Outcome::Failed { reason } if reason.contains("bridge-missing")));
        assert_eq!(inventory.records(EntityKind::IpAddress).await.len(), 2);
    }

    #[tokio::test]
    async fn test_interface_found_in_inventory() {
        let (inventory, reconciler) = setup();
        let options = SyncOptions::default();
        let pipeline = DevicePipeline::new(&reconciler, &options);
        pipeline.run(&facts()).await;

        // Address on an interface the collector no longer lists
        let device = inventory.records(EntityKind::Device).await[0].id.clone();
        let mut bridge = Fields::new();
        bridge.insert("device".into(), json!(device.as_str()));
        bridge.insert("name".into(), json!("bridge1"));
        let bridge = inventory.seed(EntityKind::Interface, bridge).await;

        let mut facts = facts();
        facts.ip_addresses[0].interface = "bridge1".into();
        pipeline.run(&facts).await;

        let loopback = inventory
            .filter(EntityKind::IpAddress, &[("address", "10.0.0.1/32")])
            .await
            .unwrap();
        assert_eq!(loopback[0].fields["assigned_interface"], json!(bridge.id.as_str()));
    }
}
