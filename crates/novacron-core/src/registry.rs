//! Task registry
//!
//! In-memory catalog of tasks backed by [`SchedulerStore`]. Every mutation is
//! written through to the store before the cache is updated. Writes to one
//! task are serialized by a per-task mutex, so unrelated tasks never wait on
//! each other and reads never wait at all.


use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::schedule::{ExpressionEvaluator, Schedule};
use crate::store::SchedulerStore;
use crate::task::{ExecutionStatus, Task, TaskDraft, TaskSnapshot, TaskStatus};

/// A draft that passed validation
struct ValidTask {
    description: String,
    command: String,
    parameters: Option<String>,
    schedule: Schedule,
    timezone: Option<String>,
    draft: TaskDraft,
}

/// Catalog of configured tasks
pub struct TaskRegistry {
    store: Arc<SchedulerStore>,
    evaluator: ExpressionEvaluator,
    tasks: DashMap<Uuid, Task>,
    write_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl TaskRegistry {
    /// Load every stored task into memory.
    ///
    /// Active tasks without a next run (first start, or a schedule that was
    /// edited directly in the database) get one computed from `now`.
    pub async fn load(
        store: Arc<SchedulerStore>,
        evaluator: ExpressionEvaluator,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let registry = Self {
            store,
            evaluator,
            tasks: DashMap::new(),
            write_locks: DashMap::new(),
        };

        for task in registry.store.list_tasks().await? {
            let task = if task.is_active && task.next_run_at.is_none() {
                let next_run_at = registry.next_run_for(&task, now)?;
                registry
                    .store
                    .update_run_state(task.id, task.status, task.last_run_at, Some(next_run_at))
                    .await?
            } else {
                task
            };
            registry.tasks.insert(task.id, task);
        }

        info!(tasks = registry.tasks.len(), "Task registry loaded");
        Ok(registry)
    }

    /// The evaluator used for schedule validation and next-run computation
    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    /// Backing store
    pub fn store(&self) -> &Arc<SchedulerStore> {
        &self.store
    }

    /// Validate a draft and create the task
    pub async fn create(&self, draft: TaskDraft, now: DateTime<Utc>) -> Result<Task> {
        let valid = self.validate(draft)?;

        let mut task = Task::new(valid.description, valid.command, valid.schedule);
        task.parameters = valid.parameters;
        task.timezone = valid.timezone;
        apply_flags(&mut task, &valid.draft);
        task.created_at = now;
        task.updated_at = now;
        task.next_run_at = Some(self.next_run_for(&task, now)?);

        self.store.create_task(&task).await?;
        self.tasks.insert(task.id, task.clone());

        info!(task_id = %task.id, schedule = %task.schedule, "Task created");
        Ok(task)
    }

    /// Replace a task's definition.
    ///
    /// Run state (status, last run) is preserved and the next run is
    /// recomputed from `now`. Runs already in flight keep their snapshot.
    pub async fn update(&self, id: Uuid, draft: TaskDraft, now: DateTime<Utc>) -> Result<Task> {
        let valid = self.validate(draft)?;
        let _guard = self.lock_task(id).await;

        let mut task = self.stored(id).await?.ok_or(SchedulerError::TaskNotFound(id))?;
        task.description = valid.description;
        task.command = valid.command;
        task.parameters = valid.parameters;
        task.schedule = valid.schedule;
        task.timezone = valid.timezone;
        apply_flags(&mut task, &valid.draft);
        task.updated_at = now;
        task.next_run_at = if task.is_active {
            Some(self.next_run_for(&task, now)?)
        } else {
            None
        };

        let task = self.store.update_task(&task).await?;
        self.tasks.insert(id, task.clone());

        info!(task_id = %id, schedule = %task.schedule, "Task updated");
        Ok(task)
    }

    /// Enable or disable a task.
    ///
    /// Disabling clears the next run so the task is never due again; running
    /// executions are not interrupted.
    pub async fn set_active(&self, id: Uuid, active: bool, now: DateTime<Utc>) -> Result<Task> {
        let _guard = self.lock_task(id).await;

        let mut task = self.stored(id).await?.ok_or(SchedulerError::TaskNotFound(id))?;
        if task.is_active == active {
            self.tasks.insert(id, task.clone());
            return Ok(task);
        }

        task.is_active = active;
        task.updated_at = now;
        task.next_run_at = if active {
            Some(self.next_run_for(&task, now)?)
        } else {
            None
        };

        let task = self.store.update_task(&task).await?;
        self.tasks.insert(id, task.clone());

        info!(task_id = %id, active, "Task activation changed");
        Ok(task)
    }

    /// Delete a task and its results
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let guard = self.lock_task(id).await;

        self.store.delete_task(id).await?;
        self.tasks.remove(&id);

        drop(guard);
        self.write_locks.remove(&id);

        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Get a task by ID
    pub fn get(&self, id: Uuid) -> Result<Task> {
        self.tasks
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SchedulerError::TaskNotFound(id))
    }

    /// All tasks in registry order (creation time, then ID)
    pub fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.iter().map(|e| e.value().clone()).collect();
        tasks.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        tasks
    }

    /// Active tasks whose next run is at or before `now`.
    ///
    /// Ordered oldest-scheduled first, registry order breaking ties.
    pub fn list_due(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut due: Vec<Task> = self
            .tasks
            .iter()
            .filter(|e| {
                let task = e.value();
                task.is_active && task.next_run_at.is_some_and(|next| next <= now)
            })
            .map(|e| e.value().clone())
            .collect();

        due.sort_by(|a, b| {
            (a.next_run_at, a.created_at, a.id).cmp(&(b.next_run_at, b.created_at, b.id))
        });
        due
    }

    /// Freeze a task's current definition for one run
    pub fn snapshot(&self, id: Uuid, due_at: DateTime<Utc>) -> Result<TaskSnapshot> {
        Ok(TaskSnapshot::new(self.get(id)?, due_at))
    }

    /// Mark a task as running and move its next run past `now`.
    ///
    /// Works from the stored definition. Returns `None`, changing nothing,
    /// when the task was deleted or disabled through another registry. The
    /// next run set here is provisional; [`Self::record_completion`]
    /// recomputes it from the completion instant.
    pub async fn mark_dispatched(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Task>> {
        let _guard = self.lock_task(id).await;

        let Some(task) = self.stored(id).await? else {
            return Ok(None);
        };
        if !task.is_active {
            self.tasks.insert(id, task);
            return Ok(None);
        }

        let next_run_at = self.next_run_for(&task, now)?;
        let task = self
            .store
            .update_run_state(id, TaskStatus::Running, Some(now), Some(next_run_at))
            .await?;
        self.tasks.insert(id, task.clone());

        debug!(task_id = %id, next_run_at = ?task.next_run_at, "Task dispatched");
        Ok(Some(task))
    }

    /// Record a finished run.
    ///
    /// The next run is recomputed from `completed_at`, never from the missed
    /// due time, so downtime causes no catch-up runs. Edits and deactivation
    /// made elsewhere while the run was in flight are picked up here. Returns
    /// `None` when the task was deleted while running.
    pub async fn record_completion(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let _guard = self.lock_task(id).await;

        let Some(task) = self.stored(id).await? else {
            debug!(task_id = %id, "Completed task no longer exists");
            return Ok(None);
        };

        let status = if status.is_success() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        let last_run_at = match task.last_run_at {
            Some(last) if last >= started_at => Some(last),
            _ => Some(started_at),
        };
        let next_run_at = if task.is_active {
            Some(self.next_run_for(&task, completed_at)?)
        } else {
            None
        };

        let task = self
            .store
            .update_run_state(id, status, last_run_at, next_run_at)
            .await?;
        self.tasks.insert(id, task.clone());

        Ok(Some(task))
    }

    /// Undo [`Self::mark_dispatched`] for a run that never started.
    ///
    /// Status, last run and next run go back to `prior`, so the task is due
    /// again. Nothing is restored when another run has recorded its state
    /// since the dispatch at `dispatched_at`.
    pub async fn record_skip(
        &self,
        id: Uuid,
        dispatched_at: DateTime<Utc>,
        prior: &Task,
    ) -> Result<Option<Task>> {
        let _guard = self.lock_task(id).await;

        let Some(task) = self.stored(id).await? else {
            return Ok(None);
        };
        if task.status != TaskStatus::Running || task.last_run_at != Some(dispatched_at) {
            self.tasks.insert(id, task.clone());
            return Ok(Some(task));
        }

        let task = self
            .store
            .update_run_state(id, prior.status, prior.last_run_at, prior.next_run_at)
            .await?;
        self.tasks.insert(id, task.clone());

        debug!(task_id = %id, "Skipped dispatch rolled back");
        Ok(Some(task))
    }

    /// Re-read one task from the store.
    ///
    /// Servers sharing a store see each other's run state through this.
    /// Returns `None` (and forgets the task) when it was deleted elsewhere.
    pub async fn refresh_task(&self, id: Uuid) -> Result<Option<Task>> {
        let _guard = self.lock_task(id).await;

        let task = self.stored(id).await?;
        if let Some(task) = &task {
            self.tasks.insert(id, task.clone());
        }
        Ok(task)
    }

    /// Pick up tasks created, edited, or deleted through another registry
    /// sharing the same store
    pub async fn refresh(&self) -> Result<()> {
        let stored = self.store.list_tasks().await?;

        let mut seen = std::collections::HashSet::with_capacity(stored.len());
        for task in stored {
            seen.insert(task.id);
            let _guard = self.lock_task(task.id).await;

            let newer = self
                .tasks
                .get(&task.id)
                .is_none_or(|cached| task.revision > cached.revision);
            if newer {
                debug!(task_id = %task.id, "Task refreshed from store");
                self.tasks.insert(task.id, task);
            }
        }

        let missing: Vec<Uuid> = self
            .tasks
            .iter()
            .map(|e| *e.key())
            .filter(|id| !seen.contains(id))
            .collect();
        for id in missing {
            self.refresh_task(id).await?;
        }
        Ok(())
    }

    /// Next run of a task after `reference`, in the task's timezone
    pub fn next_run_for(&self, task: &Task, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.evaluator
            .next_run(&task.schedule, task.timezone.as_deref(), reference)
    }

    fn validate(&self, draft: TaskDraft) -> Result<ValidTask> {
        let description = draft.description.trim().to_string();
        if description.is_empty() {
            return Err(SchedulerError::validation("description", "must not be empty"));
        }

        let command = draft.command.trim().to_string();
        if command.is_empty() {
            return Err(SchedulerError::validation("command", "must not be empty"));
        }

        let parameters = draft
            .parameters
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let schedule = Schedule::from_parts(
            draft.expression.as_deref(),
            draft.frequency.as_deref(),
            draft
                .frequency_parameters
                .iter()
                .map(|p| p.trim().to_string())
                .collect(),
        )?;
        self.evaluator.validate(&schedule)?;

        let timezone = draft
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .map(str::to_string);
        self.evaluator.resolve_timezone(timezone.as_deref())?;

        let mut draft = draft;
        draft.notifications = std::mem::take(&mut draft.notifications).normalized();
        draft.notifications.validate()?;
        draft.max_runtime_secs = draft.max_runtime_secs.filter(|secs| *secs > 0);

        Ok(ValidTask {
            description,
            command,
            parameters,
            schedule,
            timezone,
            draft,
        })
    }

    // Latest stored copy; a task deleted elsewhere is forgotten
    async fn stored(&self, id: Uuid) -> Result<Option<Task>> {
        match self.store.get_task(id).await {
            Ok(task) => Ok(Some(task)),
            Err(SchedulerError::TaskNotFound(_)) => {
                self.tasks.remove(&id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn lock_task(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .write_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

fn apply_flags(task: &mut Task, draft: &TaskDraft) {
    task.dont_overlap = draft.dont_overlap;
    task.run_in_maintenance = draft.run_in_maintenance;
    task.run_on_one_server = draft.run_on_one_server;
    task.notifications = draft.notifications.clone();
    task.auto_cleanup = draft.auto_cleanup;
    task.max_runtime_secs = draft.max_runtime_secs;
}
