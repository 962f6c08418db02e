//! Host maintenance mode
//!
//! While the host is in maintenance mode, tasks without
//! `run_in_maintenance` are deferred.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Source of the host's maintenance state
pub trait MaintenanceMode: Send + Sync {
    /// Whether the host is currently in maintenance mode
    fn is_active(&self) -> bool;
}

/// Maintenance state toggled in process
#[derive(Debug, Default)]
pub struct MaintenanceSwitch {
    active: AtomicBool,
}

impl MaintenanceSwitch {
    /// Create a switch in the given state
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    /// Enter or leave maintenance mode
    pub fn set(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl MaintenanceMode for MaintenanceSwitch {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Maintenance mode signalled by the presence of a flag file
#[derive(Debug, Clone)]
pub struct MaintenanceFile {
    path: PathBuf,
}

impl MaintenanceFile {
    /// Watch the given flag file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MaintenanceMode for MaintenanceFile {
    fn is_active(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_switch() {
        let switch = MaintenanceSwitch::default();
        assert!(!switch.is_active());
        switch.set(true);
        assert!(switch.is_active());
        assert!(MaintenanceSwitch::new(true).is_active());
    }

    #[test]
    fn test_flag_file() {
        let dir = TempDir::new().unwrap();
        let flag = dir.path().join("down");
        let mode = MaintenanceFile::new(&flag);

        assert!(!mode.is_active());
        std::fs::write(&flag, b"").unwrap();
        assert!(mode.is_active());
        std::fs::remove_file(&flag).unwrap();
        assert!(!mode.is_active());
    }
}
