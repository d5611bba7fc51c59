//! Fleetsync Inventory - Clients for the asset inventory (CMDB)
//!
//! This crate is the only part of fleetsync that talks to the inventory:
//! - The [`Inventory`] trait with its error taxonomy
//! - A Nautobot REST client
//! - An in-memory inventory for tests and dry runs
//! - Bounded retry of transient transport failures

pub mod client;
pub mod memory;
pub mod nautobot;
pub mod retry;

pub use client::{Inventory, InventoryError, InventoryResult};
pub use memory::{Call, MemoryInventory, Operation};
pub use nautobot::{NautobotClient, NautobotConfig};
pub use retry::{RetryPolicy, RetryingInventory};
