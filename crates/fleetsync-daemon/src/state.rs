//! Application state management

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fleetsync_engine::{KeyedLocks, Reconciler, RunReport, SyncRunner};
use fleetsync_inventory::{Inventory, MemoryInventory, NautobotClient, RetryingInventory};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::Config;
use crate::facts;

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Directory of fact documents
    pub facts_path: PathBuf,
    /// Sync coordinator
    pub runner: SyncRunner,
    /// Most recent run report
    pub last_report: RwLock<Option<RunReport>>,
    /// Held for the duration of a run; runs never overlap
    running: Mutex<()>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, facts_path: PathBuf, dry_run: bool) -> Result<Arc<Self>> {
        let inventory: Arc<dyn Inventory> = if dry_run {
            info!("Dry run: reconciling against an empty in-memory inventory");
            Arc::new(MemoryInventory::new())
        } else {
            let client = NautobotClient::new(config.to_nautobot_config())
                .context("Failed to create inventory client")?;
            Arc::new(RetryingInventory::new(client, config.to_retry_policy()))
        };
        Ok(Self::with_inventory(config, facts_path, inventory, dry_run))
    }

    pub fn with_inventory(
        config: Config,
        facts_path: PathBuf,
        inventory: Arc<dyn Inventory>,
        dry_run: bool,
    ) -> Arc<Self> {
        let reconciler = Reconciler::new(inventory, KeyedLocks::new(), config.sync.dedup_policy);
        let runner = SyncRunner::new(
            Arc::new(reconciler),
            config.to_sync_options(dry_run),
            config.sync.concurrency,
        );

        Arc::new(Self {
            config,
            facts_path,
            runner,
            last_report: RwLock::new(None),
            running: Mutex::new(()),
            started_at: Utc::now(),
        })
    }

    /// Load facts and run a full sync, unless one is already running.
    ///
    /// Returns `None` when another run holds the lock.
    pub async fn try_sync(&self) -> Result<Option<RunReport>> {
        let Ok(_running) = self.running.try_lock() else {
            return Ok(None);
        };
        self.sync_locked().await.map(Some)
    }

    /// Run a full sync, waiting for any run in progress to finish first
    pub async fn sync(&self) -> Result<RunReport> {
        let _running = self.running.lock().await;
        self.sync_locked().await
    }

    async fn sync_locked(&self) -> Result<RunReport> {
        let loaded = facts::load_dir(&self.facts_path)
            .with_context(|| format!("Failed to load facts from {}", self.facts_path.display()))?;
        let report = self.runner.sync(loaded.bundles, loaded.rejected).await;
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }
}
