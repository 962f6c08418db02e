//! Server configuration types

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use novacron_core::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub lock: LockSection,
    #[serde(default)]
    pub maintenance: MaintenanceSection,
}

impl AppConfig {
    /// Check values the engine cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.lock.backend == LockBackend::Redis && self.lock.redis_url.trim().is_empty() {
            bail!("lock.redis_url is required for the redis backend");
        }
        if self.executor.shell.trim().is_empty() {
            bail!("executor.shell must not be empty");
        }
        Ok(())
    }
}

/// `[scheduler]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default)]
    pub database_path: String,
    #[serde(default)]
    pub server_id: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,
    #[serde(default)]
    pub default_timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_retention_interval")]
    pub retention_interval_secs: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            server_id: String::new(),
            timezone: default_timezone(),
            tick_interval_secs: default_tick_interval(),
            max_concurrent: default_max_concurrent(),
            lock_ttl_secs: default_lock_ttl(),
            default_timeout_secs: 0,
            max_output_bytes: default_max_output_bytes(),
            retention_interval_secs: default_retention_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SchedulerSection {
    /// Database file, defaulting to `~/.novacron/novacron.db`
    pub fn database_path(&self) -> PathBuf {
        if self.database_path.trim().is_empty() {
            default_data_dir().join("novacron.db")
        } else {
            PathBuf::from(&self.database_path)
        }
    }

    /// Server identity, defaulting to the host name
    pub fn server_id(&self) -> String {
        let configured = self.server_id.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Engine configuration for this server
    pub fn engine_config(&self, lock_key_prefix: &str) -> SchedulerConfig {
        let default_timeout =
            (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs));

        let mut config = SchedulerConfig::new()
            .with_server_id(self.server_id())
            .with_check_interval(self.tick_interval_secs)
            .with_max_concurrent(self.max_concurrent)
            .with_lock_ttl(Duration::from_secs(self.lock_ttl_secs))
            .with_lock_key_prefix(lock_key_prefix)
            .with_default_timeout(default_timeout)
            .with_max_output_bytes(self.max_output_bytes)
            .with_retention_interval(Duration::from_secs(self.retention_interval_secs))
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs));
        config.event_capacity = self.event_capacity;
        config
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_tick_interval() -> u64 {
    60
}
fn default_max_concurrent() -> usize {
    10
}
fn default_lock_ttl() -> u64 {
    3600
}
fn default_max_output_bytes() -> usize {
    64 * 1024
}
fn default_retention_interval() -> u64 {
    3600
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_event_capacity() -> usize {
    256
}

/// Home of the default database
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".novacron"))
        .unwrap_or_else(|| PathBuf::from(".novacron"))
}

/// `[executor]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub working_dir: String,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            working_dir: String::new(),
        }
    }
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

/// Lease backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    #[default]
    Memory,
    Redis,
}

/// `[lock]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSection {
    #[serde(default)]
    pub backend: LockBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            backend: LockBackend::Memory,
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_key_prefix() -> String {
    "novacron:".to_string()
}

/// `[maintenance]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceSection {
    #[serde(default)]
    pub flag_file: String,
}

impl MaintenanceSection {
    pub fn flag_file(&self) -> Option<PathBuf> {
        let path = self.flag_file.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}
