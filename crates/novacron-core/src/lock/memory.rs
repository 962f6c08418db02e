use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::LockService;
use crate::error::Result;

struct Lease {
    owner: String,
    expires_at: Instant,
}

/// In-process lease table.
///
/// Scheduler engines sharing one instance (behind an `Arc`) coordinate
/// exactly like servers sharing a Redis.
#[derive(Default)]
pub struct MemoryLockService {
    leases: DashMap<String, Lease>,
}

impl MemoryLockService {
    /// Create an empty lease table
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a key, ignoring expired leases
    pub fn holder(&self, key: &str) -> Option<String> {
        self.leases
            .get(key)
            .filter(|lease| lease.expires_at > Instant::now())
            .map(|lease| lease.owner.clone())
    }
}

#[async_trait]
impl LockService for MemoryLockService {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let lease = Lease {
            owner: owner.to_string(),
            expires_at: now + ttl,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if current.owner == owner || current.expires_at <= now {
                    entry.insert(lease);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(lease);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> Result<()> {
        self.leases.remove_if(key, |_, lease| lease.owner == owner);
        Ok(())
    }
}
