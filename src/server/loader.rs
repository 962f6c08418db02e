//! Configuration loading
//!
//! Layers, lowest priority first: the defaults compiled into the binary, one
//! TOML file, then `NOVACRON_<SECTION>__<KEY>` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

use super::config::{default_data_dir, AppConfig};

/// Embedded default configuration
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration for this process.
///
/// The file is `$NOVACRON_CONFIG` when set, and must then exist. Otherwise
/// `~/.novacron/config.toml` is used if present.
pub fn load_config() -> Result<AppConfig> {
    match std::env::var_os("NOVACRON_CONFIG") {
        Some(path) => load_from(Path::new(&path), true),
        None => load_from(&default_config_file(), false),
    }
}

/// Per-user config file location
pub fn default_config_file() -> PathBuf {
    default_data_dir().join("config.toml")
}

fn load_from(file: &Path, required: bool) -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::from(file).format(FileFormat::Toml).required(required))
        // NOVACRON_SCHEDULER__TICK_INTERVAL_SECS, single underscore after the prefix
        .add_source(
            Environment::with_prefix("NOVACRON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read configuration from {}", file.display()))?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::LockBackend;
    use tempfile::TempDir;

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("novacron.toml");
        std::fs::write(
            &path,
            "[scheduler]\nmax_concurrent = 3\n\n[lock]\nbackend = \"redis\"\nredis_url = \"redis://cache:6379\"\n",
        )
        .unwrap();

        let config = load_from(&path, true).unwrap();
        assert_eq!(config.scheduler.max_concurrent, 3);
        assert_eq!(config.lock.backend, LockBackend::Redis);
        assert_eq!(config.executor.shell, "/bin/sh");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(load_from(&path, true).is_err());
        let config = load_from(&path, false).unwrap();
        assert_eq!(config.lock.key_prefix, "novacron:");
    }
}
