use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::task::{ExecutionResult, NotificationTargets, Task};

/// Why a due task was not dispatched this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// Host is in maintenance mode and the task does not run in it
    Maintenance,
    /// A previous run of a `dont_overlap` task is still active
    Overlap,
    /// Another server holds the lease for this due time
    LockHeld,
    /// The lock service could not be reached
    LockError,
    /// Every worker slot is busy
    PoolSaturated,
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Maintenance => "maintenance",
            Self::Overlap => "overlap",
            Self::LockHeld => "lock_held",
            Self::LockError => "lock_error",
            Self::PoolSaturated => "pool_saturated",
        };
        f.write_str(name)
    }
}

/// Request to deliver a notification about a finished run.
///
/// Delivery over email, SMS, or webhook happens outside the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationIntent {
    /// Task that ran
    pub task_id: Uuid,
    /// Task description at dispatch time
    pub description: String,
    /// Where to deliver
    pub targets: NotificationTargets,
    /// The terminal result
    pub result: ExecutionResult,
}

impl NotificationIntent {
    /// Build an intent when the task has at least one target
    #[must_use]
    pub fn for_result(task: &Task, result: &ExecutionResult) -> Option<Self> {
        if task.notifications.is_empty() {
            return None;
        }

        Some(Self {
            task_id: task.id,
            description: task.description.clone(),
            targets: task.notifications.clone(),
            result: result.clone(),
        })
    }
}

/// Events emitted by the scheduler
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A due task was handed to a worker
    TaskDispatched {
        /// Task identifier
        task_id: Uuid,
        /// Due instant being served
        due_at: DateTime<Utc>,
        /// Server that took it
        server_id: String,
    },
    /// A due task stays due until a later tick
    TaskDeferred {
        /// Task identifier
        task_id: Uuid,
        /// Due instant that was not served
        due_at: DateTime<Utc>,
        /// Why
        reason: DeferReason,
    },
    /// A run reached a terminal status and its result is stored
    ExecutionFinished {
        /// Task identifier
        task_id: Uuid,
        /// The stored result
        result: ExecutionResult,
    },
    /// A finished run should be reported to the task's targets
    NotificationRequested(NotificationIntent),
    /// Retention removed results of a task
    RetentionApplied {
        /// Task identifier
        task_id: Uuid,
        /// Number of deleted results
        deleted: u64,
    },
}

impl SchedulerEvent {
    /// Task the event is about
    #[must_use]
    pub fn task_id(&self) -> Uuid {
        match self {
            Self::TaskDispatched { task_id, .. }
            | Self::TaskDeferred { task_id, .. }
            | Self::ExecutionFinished { task_id, .. }
            | Self::RetentionApplied { task_id, .. } => *task_id,
            Self::NotificationRequested(intent) => intent.task_id,
        }
    }
}
