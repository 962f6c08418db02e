//! Task executor
//!
//! Runs one [`TaskSnapshot`] through a [`CommandRunner`], measures it, and
//! appends the [`ExecutionResult`] to the store before returning.

mod runner;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::store::SchedulerStore;
use crate::task::{ExecutionOutcome, ExecutionResult, ExecutionStatus, Task, TaskSnapshot};

pub use runner::{CommandOutput, CommandRunner, ShellRunner};

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Runs task commands and records their results
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    store: Arc<SchedulerStore>,
    server_id: String,
    default_timeout: Option<Duration>,
    max_output_bytes: usize,
    running: DashMap<Uuid, usize>,
}

impl Executor {
    /// Create an executor with no default timeout and 64 KiB of output
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        store: Arc<SchedulerStore>,
        server_id: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            store,
            server_id: server_id.into(),
            default_timeout: None,
            max_output_bytes: 64 * 1024,
            running: DashMap::new(),
        }
    }

    /// Timeout for tasks without their own `max_runtime_secs`
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Cap on captured output per result
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    /// Server ID stamped on results
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Whether at least one run of the task is in flight on this server
    pub fn is_running(&self, task_id: Uuid) -> bool {
        self.running_count(task_id) > 0
    }

    /// Number of in-flight runs of the task on this server
    pub fn running_count(&self, task_id: Uuid) -> usize {
        self.running.get(&task_id).map(|count| *count).unwrap_or(0)
    }

    /// Run a snapshot to a terminal status.
    ///
    /// A `dont_overlap` task that already has a run in flight is refused with
    /// [`ExecutionOutcome::SkippedOverlap`]. Command failures and timeouts are
    /// captured in the result; only storage errors are returned as `Err`.
    pub async fn execute(&self, snapshot: &TaskSnapshot) -> Result<ExecutionOutcome> {
        let task = &snapshot.task;
        let Some(_guard) = self.try_start(task) else {
            info!(task_id = %task.id, "Run skipped, previous run still active");
            return Ok(ExecutionOutcome::SkippedOverlap);
        };

        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let timeout = task
            .max_runtime_secs
            .map(Duration::from_secs)
            .or(self.default_timeout);

        let run = self.runner.run(&task.command, task.parameters.as_deref());
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => Err(SchedulerError::ExecutionTimeout(limit.as_secs())),
            },
            None => run.await,
        };

        let duration_ms = i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX);
        let (status, exit_code, output) = match outcome {
            Ok(out) if out.success() => (ExecutionStatus::Success, out.exit_code, out.output),
            Ok(out) => (ExecutionStatus::Failure, out.exit_code, out.output),
            Err(e @ SchedulerError::ExecutionTimeout(_)) => {
                (ExecutionStatus::Timeout, None, e.to_string())
            }
            Err(e) => (ExecutionStatus::Failure, None, e.to_string()),
        };

        let result = ExecutionResult {
            id: Uuid::new_v4(),
            task_id: task.id,
            due_at: snapshot.due_at,
            started_at,
            duration_ms,
            status,
            exit_code,
            output: truncate_output(output, self.max_output_bytes),
            server_id: self.server_id.clone(),
        };

        self.store.append_result(&result).await?;

        if status.is_success() {
            info!(task_id = %task.id, duration_ms, "Task run succeeded");
        } else {
            warn!(
                task_id = %task.id,
                status = %status,
                exit_code = ?exit_code,
                duration_ms,
                "Task run did not succeed"
            );
        }

        Ok(ExecutionOutcome::Completed(result))
    }

    fn try_start(&self, task: &Task) -> Option<RunningGuard<'_>> {
        match self.running.entry(task.id) {
            Entry::Occupied(mut entry) => {
                if task.dont_overlap && *entry.get() > 0 {
                    return None;
                }
                *entry.get_mut() += 1;
            }
            Entry::Vacant(entry) => {
                entry.insert(1);
            }
        }

        Some(RunningGuard {
            running: &self.running,
            task_id: task.id,
        })
    }
}

/// Decrements the in-flight count of a task when dropped
struct RunningGuard<'a> {
    running: &'a DashMap<Uuid, usize>,
    task_id: Uuid,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut count) = self.running.get_mut(&self.task_id) {
            *count = count.saturating_sub(1);
        }
        self.running.remove_if(&self.task_id, |_, count| *count == 0);
    }
}

fn truncate_output(mut output: String, max: usize) -> String {
    if output.len() <= max {
        return output;
    }

    let mut cut = max;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str(TRUNCATION_MARKER);
    output
}
