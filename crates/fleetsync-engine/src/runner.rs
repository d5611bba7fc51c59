//! Bounded worker pool running one pipeline per device

use chrono::Utc;
use fleetsync_core::FactBundle;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::pipeline::{DevicePipeline, SyncOptions};
use crate::reconciler::Reconciler;
use crate::report::{DeviceReport, DeviceSyncStatus, RunReport};

/// Default number of devices synced at once
pub const DEFAULT_CONCURRENCY: usize = 8;

pub struct SyncRunner {
    reconciler: Arc<Reconciler>,
    options: Arc<SyncOptions>,
    concurrency: usize,
}

impl SyncRunner {
    pub fn new(reconciler: Arc<Reconciler>, options: SyncOptions, concurrency: usize) -> Self {
        Self {
            reconciler,
            options: Arc::new(options),
            concurrency: concurrency.max(1),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Sync every bundle, at most `concurrency` at a time.
    ///
    /// Reports come back in input order. A device whose task panicked is
    /// reported as failed; its siblings keep running.
    pub async fn run(&self, bundles: Vec<FactBundle>) -> Vec<DeviceReport> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let names: Vec<String> = bundles.iter().map(|b| b.name.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, facts) in bundles.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let reconciler = self.reconciler.clone();
            let options = self.options.clone();
            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let report = DevicePipeline::new(&reconciler, &options).run(&facts).await;
                (index, report)
            });
        }

        let mut slots: Vec<Option<DeviceReport>> = vec![None; names.len()];
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!(error = %e, "Device sync task failed"),
            }
        }

        self.reconciler.locks().prune().await;

        slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| DeviceReport::failed(name, "sync task panicked"))
            })
            .collect()
    }

    /// Sync `bundles` and fold the results, plus devices whose facts were
    /// rejected before reaching the pipeline, into one run report
    pub async fn sync(&self, bundles: Vec<FactBundle>, rejected: Vec<DeviceReport>) -> RunReport {
        let started_at = Utc::now();
        info!(devices = bundles.len() + rejected.len(), concurrency = self.concurrency, "Starting sync run");

        let mut devices = rejected;
        devices.extend(self.run(bundles).await);
        let report = RunReport::new(started_at, devices, self.options.dry_run);

        info!(
            run = %report.id,
            succeeded = report.count(DeviceSyncStatus::Succeeded),
            partial = report.count(DeviceSyncStatus::Partial),
            failed = report.count(DeviceSyncStatus::Failed),
            "Sync run finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupPolicy;
    use crate::locks::KeyedLocks;
    use fleetsync_core::EntityKind;
    use fleetsync_inventory::MemoryInventory;
    use std::time::Duration;

    fn bundle(name: &str, address: &str) -> FactBundle {
        FactBundle::from_json(&format!(
            r#"{{
                "name": "{name}",
                "serial": "SN-{name}",
                "model": "CCR2004-1G-12S+2XS",
                "interfaces": [{{"name": "ether1", "type": "ether", "default-name": "ether1"}}],
                "ip_addresses": [
                    {{"address": "{address}/24", "network": "10.20.0.0", "interface": "ether1", "disabled": "false"}}
                ]
            }}"#
        ))
        .unwrap()
    }

    fn runner(inventory: Arc<MemoryInventory>, concurrency: usize) -> SyncRunner {
        let reconciler = Reconciler::new(inventory, KeyedLocks::new(), DedupPolicy::First);
        SyncRunner::new(Arc::new(reconciler), SyncOptions::default(), concurrency)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_devices_share_site_and_prefix() {
        let inventory =
            Arc::new(MemoryInventory::new().with_latency(Duration::from_millis(2)));
        let runner = runner(inventory.clone(), 4);
        let bundles = (1..=6)
            .map(|i| bundle(&format!("hq-edge{}", i), &format!("10.20.0.{}", i)))
            .collect();

        let reports = runner.run(bundles).await;
        assert_eq!(reports.len(), 6);
        assert_eq!(reports[0].device, "hq-edge1");
        assert!(reports.iter().all(|r| r.status == DeviceSyncStatus::Succeeded));

        assert_eq!(inventory.records(EntityKind::Site).await.len(), 1);
        assert_eq!(inventory.records(EntityKind::DeviceType).await.len(), 1);
        assert_eq!(inventory.records(EntityKind::Prefix).await.len(), 1);
        assert_eq!(inventory.records(EntityKind::Device).await.len(), 6);
        assert_eq!(inventory.records(EntityKind::IpAddress).await.len(), 6);
        assert!(runner.reconciler.locks().is_empty().await);
    }

    #[tokio::test]
    async fn test_sync_includes_rejected_devices() {
        let inventory = Arc::new(MemoryInventory::new());
        let runner = runner(inventory, 1);
        let report = runner
            .sync(
                vec![bundle("lab-ap1", "10.20.0.9")],
                vec![DeviceReport::failed("broken.json", "Device name missing from facts")],
            )
            .await;

        assert_eq!(report.devices.len(), 2);
        assert_eq!(report.count(DeviceSyncStatus::Failed), 1);
        assert_eq!(report.count(DeviceSyncStatus::Succeeded), 1);
        assert_eq!(report.totals[&EntityKind::Site].created, 1);
    }

    #[tokio::test]
    async fn test_second_run_writes_nothing() {
        let inventory = Arc::new(MemoryInventory::new());
        let runner = runner(inventory.clone(), 2);
        let bundles = vec![bundle("hq-edge1", "10.20.0.1"), bundle("hq-edge2", "10.20.0.2")];
        runner.run(bundles.clone()).await;

        inventory.clear_calls().await;
        let report = runner.sync(bundles, Vec::new()).await;
        assert!(inventory.writes().await.is_empty());
        assert!(report.totals.values().all(|s| s.writes() == 0));
    }
}
