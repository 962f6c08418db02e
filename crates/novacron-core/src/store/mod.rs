//! Task and result storage using SQLite
//!
//! Persists tasks and execution results for durability across restarts.
//! Results are foreign-keyed to their task and indexed by task and start
//! time for retention scans.

mod migrations;
mod queries;
mod results;

#[cfg(test)]
mod tests;

use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use crate::error::{Result, SchedulerError};

pub use results::ResultStats;

/// SQLite-based scheduler store
pub struct SchedulerStore {
    pub(super) pool: Pool<Sqlite>,
}

impl SchedulerStore {
    /// Create a new store from database path
    pub async fn from_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SchedulerError::InvalidConfig(format!("Failed to create directory: {}", e))
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
