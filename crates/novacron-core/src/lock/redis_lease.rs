use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::LockService;
use crate::error::{Result, SchedulerError};

// Delete only if the caller still owns the lease
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed leases shared by every server of a fleet
pub struct RedisLockService {
    client: redis::Client,
}

impl RedisLockService {
    /// Create a lock service for the given Redis URL
    ///
    /// # Errors
    ///
    /// Returns error if the Redis URL is invalid
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SchedulerError::LockService(e.to_string()))?;
        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SchedulerError::LockService(format!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl LockService for RedisLockService {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::LockService(format!("Redis SET failed: {}", e)))?;

        if reply.is_some() {
            debug!(key = %key, owner = %owner, ttl_ms, "Lease acquired");
            return Ok(true);
        }

        // Re-acquiring our own lease refreshes it
        let holder: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::LockService(format!("Redis GET failed: {}", e)))?;

        if holder.as_deref() == Some(owner) {
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_ms)
                .query_async::<i64>(&mut conn)
                .await
                .map_err(|e| SchedulerError::LockService(format!("Redis PEXPIRE failed: {}", e)))?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;

        let deleted: i64 = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(owner)
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::LockService(format!("Redis EVAL failed: {}", e)))?;

        debug!(key = %key, owner = %owner, released = deleted > 0, "Lease released");
        Ok(())
    }
}
