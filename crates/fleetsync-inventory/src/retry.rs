//! Bounded retry with exponential backoff for transient inventory failures

use async_trait::async_trait;
use fleetsync_core::{EntityKind, Fields, Record};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{Inventory, InventoryResult};

/// How often and how patiently to retry transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the given retry (1-based), doubling each time up to the cap
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying only while it fails with a transient error
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> InventoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InventoryResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = %what,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient inventory failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => {
                    if attempt > 1 && result.is_ok() {
                        debug!(op = %what, attempt = attempt, "Inventory call recovered");
                    }
                    return result;
                }
            }
        }
    }
}

/// Wraps an inventory so every call gets the retry policy
pub struct RetryingInventory<I> {
    inner: I,
    policy: RetryPolicy,
}

impl<I: Inventory> RetryingInventory<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

#[async_trait]
impl<I: Inventory> Inventory for RetryingInventory<I> {
    async fn filter(
        &self,
        kind: EntityKind,
        filters: &[(&str, &str)],
    ) -> InventoryResult<Vec<Record>> {
        self.policy
            .run(&format!("filter {}", kind), || self.inner.filter(kind, filters))
            .await
    }

    async fn create(&self, kind: EntityKind, fields: &Fields) -> InventoryResult<Record> {
        self.policy
            .run(&format!("create {}", kind), || self.inner.create(kind, fields))
            .await
    }

    async fn update(&self, record: &Record, fields: &Fields) -> InventoryResult<Record> {
        self.policy
            .run(&format!("update {}", record.kind), || {
                self.inner.update(record, fields)
            })
            .await
    }

    async fn delete(&self, record: &Record) -> InventoryResult<()> {
        self.policy
            .run(&format!("delete {}", record.kind), || self.inner.delete(record))
            .await
    }
}
