//! Cluster lock service
//!
//! Leases keyed by string, each held by one owner (a server ID) until it is
//! released or its TTL runs out. A crashed holder therefore blocks a key for
//! at most one TTL.
//!
//! - [`MemoryLockService`]: in-process leases, for single-host setups and tests
//! - [`RedisLockService`]: `SET NX PX` leases shared by a fleet

mod memory;
mod redis_lease;


use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

pub use memory::MemoryLockService;
pub use redis_lease::RedisLockService;

/// Linearizable lease service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockService: Send + Sync {
    /// Take the lease on `key` for `owner`.
    ///
    /// Returns `false` when another owner holds an unexpired lease. Taking a
    /// lease the same owner already holds refreshes it.
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool>;

    /// Give up the lease if `owner` still holds it
    async fn release(&self, key: &str, owner: &str) -> Result<()>;
}

/// Key for the one-server-per-due-time lease
#[must_use]
pub fn run_lock_key(prefix: &str, task_id: Uuid, due_at: DateTime<Utc>) -> String {
    format!("{}task:{}:{}", prefix, task_id, due_at.timestamp())
}

/// Key for the fleet-wide no-overlap lease
#[must_use]
pub fn overlap_lock_key(prefix: &str, task_id: Uuid) -> String {
    format!("{}task:{}:running", prefix, task_id)
}
