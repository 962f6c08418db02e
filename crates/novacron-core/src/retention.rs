//! Result retention
//!
//! Applies each task's [`AutoCleanup`](crate::task::AutoCleanup) policy.
//! Sweeps run periodically from the engine, never on the write path.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};
use crate::events::{EventBus, SchedulerEvent};
use crate::store::SchedulerStore;
use crate::task::{CleanupType, Task};

/// Summary of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Tasks with cleanup enabled that were inspected
    pub tasks_checked: usize,
    /// Results deleted across all tasks
    pub deleted: u64,
    /// Tasks whose cleanup failed
    pub failures: usize,
}

/// Deletes results according to per-task policy
pub struct Retention {
    store: Arc<SchedulerStore>,
    events: Option<EventBus>,
}

impl Retention {
    /// Create a retention worker over the given store
    pub fn new(store: Arc<SchedulerStore>) -> Self {
        Self {
            store,
            events: None,
        }
    }

    /// Publish [`SchedulerEvent::RetentionApplied`] on this bus
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Apply one task's policy.
    ///
    /// By age, results started more than `threshold` days before `now` are
    /// deleted, sparing the newest one. By count, only the newest `threshold`
    /// results are kept. A zero threshold does nothing.
    pub async fn apply(&self, task: &Task, now: DateTime<Utc>) -> Result<u64> {
        let policy = task.auto_cleanup;
        if !policy.is_enabled() {
            return Ok(0);
        }

        let deleted = match policy.kind {
            CleanupType::Days => {
                let cutoff = now - Duration::days(i64::from(policy.threshold));
                self.store.delete_results_older_than(task.id, cutoff).await
            }
            CleanupType::Results => self.store.keep_latest_results(task.id, policy.threshold).await,
        }
        .map_err(|e| SchedulerError::RetentionIo(e.to_string()))?;

        if deleted > 0 {
            debug!(task_id = %task.id, deleted, "Retention applied");
            if let Some(events) = &self.events {
                events.publish(SchedulerEvent::RetentionApplied {
                    task_id: task.id,
                    deleted,
                });
            }
        }

        Ok(deleted)
    }

    /// Apply every task's policy; one task's failure does not stop the rest
    pub async fn sweep(&self, tasks: &[Task], now: DateTime<Utc>) -> RetentionReport {
        let mut report = RetentionReport::default();

        for task in tasks.iter().filter(|t| t.auto_cleanup.is_enabled()) {
            report.tasks_checked += 1;
            match self.apply(task, now).await {
                Ok(deleted) => report.deleted += deleted,
                Err(e) => {
                    report.failures += 1;
                    warn!(task_id = %task.id, error = %e, "Retention failed");
                }
            }
        }

        report
    }
}
