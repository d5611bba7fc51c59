//! Fleetsync Engine - Reconciles device facts into the inventory
//!
//! The engine turns a [`FactBundle`](fleetsync_core::FactBundle) into
//! inventory records:
//! - Natural-key resolution and duplicate collapse
//! - Create-or-update reconciliation per entity, serialized per shared key
//! - An ordered per-device pipeline (site, device type, device, interfaces,
//!   prefixes, IP addresses) with per-entity outcomes
//! - A bounded worker pool running one pipeline per device

pub mod dedup;
pub mod desired;
pub mod error;
pub mod locks;
pub mod pipeline;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod runner;

pub use dedup::{canonicalize, Canonical, DedupPolicy};
pub use error::SyncError;
pub use locks::KeyedLocks;
pub use pipeline::{DevicePipeline, SyncOptions};
pub use reconciler::{Action, Reconciled, Reconciler};
pub use report::{DeviceReport, DeviceSyncStatus, EntityOutcome, KindSummary, Outcome, RunReport};
pub use resolver::resolve;
pub use runner::{SyncRunner, DEFAULT_CONCURRENCY};
