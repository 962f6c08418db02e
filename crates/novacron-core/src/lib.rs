//! Novacron Core - Task Scheduling Engine
//!
//! This crate provides the scheduling core for Novacron, including:
//! - Schedule: cron expressions, named frequencies and next-run computation
//! - Registry: task definitions persisted in SQLite
//! - Engine: the tick loop and its bounded worker pool
//! - Executor: command execution with timeouts and output capture
//! - Retention: per-task result cleanup
//! - Lock: cluster leases for single-server and non-overlapping runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod lock;
pub mod maintenance;
pub mod registry;
pub mod retention;
pub mod schedule;
pub mod shutdown;
pub mod store;
pub mod task;

pub use engine::{SchedulerConfig, SchedulerEngine, SchedulerEngineBuilder, TickReport};
pub use error::{Result, SchedulerError};
pub use events::{
    DeferReason, EventBus, NotificationIntent, NotificationReceiver, SchedulerEvent,
};
pub use executor::{CommandOutput, CommandRunner, Executor, ShellRunner};
pub use lock::{overlap_lock_key, run_lock_key, LockService, MemoryLockService, RedisLockService};
pub use maintenance::{MaintenanceFile, MaintenanceMode, MaintenanceSwitch};
pub use registry::TaskRegistry;
pub use retention::{Retention, RetentionReport};
pub use schedule::{frequencies, lookup_frequency, ExpressionEvaluator, Frequency, Schedule};
pub use store::{ResultStats, SchedulerStore};
pub use task::{
    AutoCleanup, CleanupType, ExecutionOutcome, ExecutionResult, ExecutionStatus,
    NotificationTargets, Task, TaskDraft, TaskSnapshot, TaskStatus, TaskView,
};
