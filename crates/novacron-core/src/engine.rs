//! Scheduler execution engine
//!
//! A single loop ticks at a fixed interval, asks the registry which tasks are
//! due, and hands each one to a bounded worker pool. The loop never waits on
//! a running command. Per due task, dispatch is blocked (the task stays due
//! and is retried next tick) by:
//! - host maintenance mode, unless the task runs in maintenance
//! - a still-running previous run of a `dont_overlap` task
//! - the cluster lease for a `run_on_one_server` task held by another server,
//!   or the shared store showing that slot already ran elsewhere
//! - a saturated worker pool


use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::events::{DeferReason, EventBus, NotificationIntent, SchedulerEvent};
use crate::executor::{CommandRunner, Executor, ShellRunner};
use crate::lock::{overlap_lock_key, run_lock_key, LockService};
use crate::maintenance::MaintenanceMode;
use crate::registry::TaskRegistry;
use crate::retention::{Retention, RetentionReport};
use crate::schedule::{frequencies, ExpressionEvaluator, Frequency};
use crate::store::SchedulerStore;
use crate::task::{
    ExecutionOutcome, ExecutionResult, ExecutionStatus, Task, TaskDraft, TaskSnapshot, TaskView,
};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Identifier stamped on results and used as lease owner
    pub server_id: String,
    /// Tick interval in seconds
    pub check_interval_secs: u64,
    /// Maximum concurrent task executions
    pub max_concurrent: usize,
    /// Lifetime of cluster leases
    pub lock_ttl: Duration,
    /// Prefix for lease keys
    pub lock_key_prefix: String,
    /// Timeout for tasks without `max_runtime_secs`
    pub default_timeout: Option<Duration>,
    /// Cap on captured output per result
    pub max_output_bytes: usize,
    /// How often retention sweeps run
    pub retention_interval: Duration,
    /// How long shutdown waits for in-flight runs
    pub shutdown_timeout: Duration,
    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            server_id: "localhost".to_string(),
            check_interval_secs: 60,
            max_concurrent: 10,
            lock_ttl: Duration::from_secs(3600),
            lock_key_prefix: "novacron:".to_string(),
            default_timeout: None,
            max_output_bytes: 64 * 1024,
            retention_interval: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            event_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server ID
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    /// Set check interval
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    /// Set max concurrent executions
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set lease lifetime
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set lease key prefix
    pub fn with_lock_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_key_prefix = prefix.into();
        self
    }

    /// Set default execution timeout
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set output cap
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    /// Set retention sweep interval
    pub fn with_retention_interval(mut self, interval: Duration) -> Self {
        self.retention_interval = interval;
        self
    }

    /// Set shutdown drain timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.server_id.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig("server_id must not be empty".to_string()));
        }
        if self.check_interval_secs == 0 {
            return Err(SchedulerError::InvalidConfig(
                "check_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent must be positive".to_string(),
            ));
        }
        if self.lock_ttl.is_zero() {
            return Err(SchedulerError::InvalidConfig("lock_ttl must be positive".to_string()));
        }
        Ok(())
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Number of due tasks considered
    pub due: usize,
    /// Tasks handed to a worker, in dispatch order
    pub dispatched: Vec<Uuid>,
    /// Tasks left due, with the reason
    pub deferred: Vec<(Uuid, DeferReason)>,
    /// Tasks whose dispatch failed with an error
    pub errors: Vec<Uuid>,
}

impl TickReport {
    /// Whether nothing was due
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.due == 0
    }
}

enum Dispatch {
    Started,
    Deferred(DeferReason),
    // Deleted or disabled elsewhere since the registry was listed
    Withdrawn,
}

struct EngineInner {
    config: SchedulerConfig,
    registry: TaskRegistry,
    executor: Executor,
    retention: Retention,
    events: EventBus,
    lock: Option<Arc<dyn LockService>>,
    maintenance: Option<Arc<dyn MaintenanceMode>>,
    workers: Arc<Semaphore>,
    tracker: TaskTracker,
}

/// Scheduler engine for executing scheduled tasks
#[derive(Clone)]
pub struct SchedulerEngine {
    inner: Arc<EngineInner>,
}

impl SchedulerEngine {
    /// Start building an engine
    pub fn builder() -> SchedulerEngineBuilder {
        SchedulerEngineBuilder::new()
    }

    /// Start the scheduler loop.
    ///
    /// Runs until `shutdown` is cancelled, then stops dispatching and waits up
    /// to the configured shutdown timeout for in-flight runs.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let config = &self.inner.config;
        info!(
            server_id = %config.server_id,
            check_interval_secs = config.check_interval_secs,
            max_concurrent = config.max_concurrent,
            "Scheduler engine starting"
        );

        let retention = tokio::spawn(self.clone().retention_loop(shutdown.child_token()));

        let period = Duration::from_secs(config.check_interval_secs);
        let start = tokio::time::Instant::now() + until_next_boundary(Utc::now(), period);
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.inner.registry.refresh().await {
                        warn!(error = %e, "Failed to refresh task registry");
                    }
                    match self.tick(Utc::now()).await {
                        Ok(report) if !report.is_idle() => debug!(
                            due = report.due,
                            dispatched = report.dispatched.len(),
                            deferred = report.deferred.len(),
                            errors = report.errors.len(),
                            "Tick complete"
                        ),
                        Ok(_) => debug!("No tasks due"),
                        Err(e) => error!(error = %e, "Scheduler tick failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Scheduler engine shutting down");
                    break;
                }
            }
        }

        if let Err(e) = retention.await {
            warn!(error = %e, "Retention worker ended abnormally");
        }

        self.shutdown().await;
        info!("Scheduler engine stopped");
        Ok(())
    }

    /// Evaluate due tasks at `now` and dispatch them.
    ///
    /// Tasks are handled in registry order. One task's error is logged and
    /// reported without affecting the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let due = self.inner.registry.list_due(now);
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let in_maintenance = self
            .inner
            .maintenance
            .as_ref()
            .is_some_and(|m| m.is_active());

        for task in due {
            let task_id = task.id;
            let due_at = task.next_run_at.unwrap_or(now);

            match self.try_dispatch(task, due_at, now, in_maintenance).await {
                Ok(Dispatch::Started) => report.dispatched.push(task_id),
                Ok(Dispatch::Withdrawn) => {
                    debug!(task_id = %task_id, "Task withdrawn before dispatch");
                }
                Ok(Dispatch::Deferred(reason)) => {
                    debug!(task_id = %task_id, reason = %reason, "Task deferred");
                    self.inner.events.publish(SchedulerEvent::TaskDeferred {
                        task_id,
                        due_at,
                        reason,
                    });
                    report.deferred.push((task_id, reason));
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Task dispatch failed");
                    report.errors.push(task_id);
                }
            }
        }

        Ok(report)
    }

    async fn try_dispatch(
        &self,
        task: Task,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
        in_maintenance: bool,
    ) -> Result<Dispatch> {
        let inner = &self.inner;

        if in_maintenance && !task.run_in_maintenance {
            return Ok(Dispatch::Deferred(DeferReason::Maintenance));
        }

        if task.dont_overlap && inner.executor.is_running(task.id) {
            return Ok(Dispatch::Deferred(DeferReason::Overlap));
        }

        let Ok(permit) = inner.workers.clone().try_acquire_owned() else {
            return Ok(Dispatch::Deferred(DeferReason::PoolSaturated));
        };

        let owner = inner.config.server_id.as_str();
        let mut run_lease = None;
        let mut overlap_lease = None;
        if let Some(lock) = &inner.lock {
            if task.run_on_one_server {
                let key = run_lock_key(&inner.config.lock_key_prefix, task.id, due_at);
                match self.acquire(lock.as_ref(), &key, owner).await {
                    Ok(()) => run_lease = Some(key),
                    Err(e) => {
                        if matches!(e, SchedulerError::LockUnavailable(_)) {
                            self.adopt_stored_state(task.id).await;
                        }
                        return Ok(Dispatch::Deferred(defer_reason(&e)));
                    }
                }

                // Another server may have run this slot and released the lease already
                match inner.registry.refresh_task(task.id).await {
                    Ok(Some(stored)) if stored.is_active && stored.next_run_at == Some(due_at) => {}
                    Ok(_) => {
                        self.release(run_lease.as_deref()).await;
                        return Ok(Dispatch::Deferred(DeferReason::LockHeld));
                    }
                    Err(e) => {
                        self.release(run_lease.as_deref()).await;
                        return Err(e);
                    }
                }
            }

            if task.dont_overlap {
                let key = overlap_lock_key(&inner.config.lock_key_prefix, task.id);
                match self.acquire(lock.as_ref(), &key, owner).await {
                    Ok(()) => overlap_lease = Some(key),
                    Err(e) => {
                        self.release(run_lease.as_deref()).await;
                        return Ok(Dispatch::Deferred(match e {
                            SchedulerError::LockUnavailable(_) => DeferReason::Overlap,
                            other => defer_reason(&other),
                        }));
                    }
                }
            }
        }

        let prior = task;
        let task = match inner.registry.mark_dispatched(prior.id, now).await {
            Ok(Some(task)) => task,
            other => {
                self.release(run_lease.as_deref()).await;
                self.release(overlap_lease.as_deref()).await;
                return other.map(|_| Dispatch::Withdrawn);
            }
        };

        info!(task_id = %task.id, due_at = %due_at, command = %task.command, "Dispatching task");
        inner.events.publish(SchedulerEvent::TaskDispatched {
            task_id: task.id,
            due_at,
            server_id: inner.config.server_id.clone(),
        });

        let snapshot = TaskSnapshot::new(task, due_at);
        let engine = self.clone();
        inner
            .tracker
            .spawn(engine.run_worker(snapshot, prior, permit, run_lease, overlap_lease));

        Ok(Dispatch::Started)
    }

    async fn run_worker(
        self,
        snapshot: TaskSnapshot,
        prior: Task,
        permit: OwnedSemaphorePermit,
        run_lease: Option<String>,
        overlap_lease: Option<String>,
    ) {
        let task_id = snapshot.task.id;

        match self.inner.executor.execute(&snapshot).await {
            Ok(ExecutionOutcome::Completed(result)) => {
                self.finish(&snapshot, &result).await;
            }
            Ok(ExecutionOutcome::SkippedOverlap) => {
                if let Some(dispatched_at) = snapshot.task.last_run_at {
                    if let Err(e) = self
                        .inner
                        .registry
                        .record_skip(task_id, dispatched_at, &prior)
                        .await
                    {
                        error!(task_id = %task_id, error = %e, "Failed to restore task state");
                    }
                }
                self.inner.events.publish(SchedulerEvent::TaskDeferred {
                    task_id,
                    due_at: snapshot.due_at,
                    reason: DeferReason::Overlap,
                });
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to record execution result");
                let now = Utc::now();
                if let Err(e) = self
                    .inner
                    .registry
                    .record_completion(task_id, ExecutionStatus::Failure, now, now)
                    .await
                {
                    error!(task_id = %task_id, error = %e, "Failed to update task state");
                }
            }
        }

        self.release(overlap_lease.as_deref()).await;
        self.release(run_lease.as_deref()).await;
        drop(permit);
    }

    async fn adopt_stored_state(&self, task_id: Uuid) {
        if let Err(e) = self.inner.registry.refresh_task(task_id).await {
            warn!(task_id = %task_id, error = %e, "Failed to refresh task from store");
        }
    }

    async fn finish(&self, snapshot: &TaskSnapshot, result: &ExecutionResult) {
        let task_id = snapshot.task.id;

        if let Err(e) = self
            .inner
            .registry
            .record_completion(task_id, result.status, result.started_at, Utc::now())
            .await
        {
            error!(task_id = %task_id, error = %e, "Failed to update task state");
        }

        self.inner.events.publish(SchedulerEvent::ExecutionFinished {
            task_id,
            result: result.clone(),
        });

        if let Some(intent) = NotificationIntent::for_result(&snapshot.task, result) {
            self.inner
                .events
                .publish(SchedulerEvent::NotificationRequested(intent));
        }
    }

    async fn acquire(&self, lock: &dyn LockService, key: &str, owner: &str) -> Result<()> {
        match lock.try_acquire(key, owner, self.inner.config.lock_ttl).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SchedulerError::LockUnavailable(key.to_string())),
            Err(e) => {
                warn!(key = %key, error = %e, "Lock service unavailable");
                Err(SchedulerError::LockService(e.to_string()))
            }
        }
    }

    async fn release(&self, key: Option<&str>) {
        self.release_as(key, &self.inner.config.server_id).await;
    }

    async fn release_as(&self, key: Option<&str>, owner: &str) {
        let (Some(lock), Some(key)) = (&self.inner.lock, key) else {
            return;
        };
        if let Err(e) = lock.release(key, owner).await {
            warn!(key = %key, error = %e, "Failed to release lease, it will expire");
        }
    }

    async fn retention_loop(self, shutdown: CancellationToken) {
        let period = self.inner.config.retention_interval;
        if period.is_zero() {
            return;
        }

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.prune().await;
                    if report.deleted > 0 || report.failures > 0 {
                        info!(
                            deleted = report.deleted,
                            failures = report.failures,
                            "Retention sweep complete"
                        );
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    /// Wait until every in-flight run has finished
    pub async fn drain(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    async fn shutdown(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();

        let in_flight = tracker.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for running tasks to complete");
        }

        if tokio::time::timeout(self.inner.config.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = tracker.len(),
                timeout_secs = self.inner.config.shutdown_timeout.as_secs(),
                "Shutdown timeout exceeded, abandoning running tasks"
            );
        }
    }

    /// Number of runs currently in flight on this server
    pub fn running_count(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// The engine's event bus
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// The task registry
    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    /// Engine configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Create a task
    pub async fn add_task(&self, draft: TaskDraft) -> Result<Task> {
        self.inner.registry.create(draft, Utc::now()).await
    }

    /// Replace a task's definition
    pub async fn update_task(&self, task_id: Uuid, draft: TaskDraft) -> Result<Task> {
        self.inner.registry.update(task_id, draft, Utc::now()).await
    }

    /// Remove a task and its results
    pub async fn remove_task(&self, task_id: Uuid) -> Result<()> {
        self.inner.registry.delete(task_id).await
    }

    /// Enable/disable a task
    pub async fn set_task_enabled(&self, task_id: Uuid, enabled: bool) -> Result<Task> {
        self.inner
            .registry
            .set_active(task_id, enabled, Utc::now())
            .await
    }

    /// Run a task right away, outside its schedule.
    ///
    /// `dont_overlap` is still honored, across the fleet when a lock service
    /// is configured. The result is stored and reported like a scheduled run.
    pub async fn execute_now(&self, task_id: Uuid) -> Result<ExecutionOutcome> {
        let inner = &self.inner;
        let snapshot = inner.registry.snapshot(task_id, Utc::now())?;

        // Unique per call, never equal to a scheduled run's owner
        let owner = format!("{}:manual:{}", inner.config.server_id, Uuid::new_v4());
        let mut overlap_lease = None;
        if let (Some(lock), true) = (&inner.lock, snapshot.task.dont_overlap) {
            let key = overlap_lock_key(&inner.config.lock_key_prefix, task_id);
            match self.acquire(lock.as_ref(), &key, &owner).await {
                Ok(()) => overlap_lease = Some(key),
                Err(SchedulerError::LockUnavailable(_)) => {
                    info!(task_id = %task_id, "Run skipped, task is running elsewhere");
                    return Ok(ExecutionOutcome::SkippedOverlap);
                }
                Err(e) => return Err(e),
            }
        }

        info!(task_id = %task_id, "Executing task on demand");
        let outcome = inner.executor.execute(&snapshot).await;
        self.release_as(overlap_lease.as_deref(), &owner).await;

        let outcome = outcome?;
        if let ExecutionOutcome::Completed(result) = &outcome {
            self.finish(&snapshot, result).await;
        }
        Ok(outcome)
    }

    /// List all tasks
    pub fn list_tasks(&self) -> Vec<Task> {
        self.inner.registry.list()
    }

    /// Get task by ID
    pub fn get_task(&self, task_id: Uuid) -> Result<Task> {
        self.inner.registry.get(task_id)
    }

    /// Task with its derived statistics
    pub async fn task_view(&self, task_id: Uuid) -> Result<TaskView> {
        let task = self.inner.registry.get(task_id)?;
        self.view_of(task).await
    }

    /// Every task with its derived statistics
    pub async fn list_task_views(&self) -> Result<Vec<TaskView>> {
        let tasks = self.inner.registry.list();
        try_join_all(tasks.into_iter().map(|task| self.view_of(task))).await
    }

    async fn view_of(&self, task: Task) -> Result<TaskView> {
        let stats = self.inner.registry.store().result_stats(task.id).await?;
        Ok(TaskView {
            task,
            average_runtime_ms: stats.average_runtime_ms,
            last_result_at: stats.last_started_at,
            result_count: stats.count,
        })
    }

    /// Newest-first results of a task
    pub async fn task_results(&self, task_id: Uuid, limit: i32) -> Result<Vec<ExecutionResult>> {
        self.inner.registry.get(task_id)?;
        self.inner
            .registry
            .store()
            .get_task_results(task_id, limit)
            .await
    }

    /// The frequency catalog
    pub fn frequencies(&self) -> &'static [Frequency] {
        frequencies()
    }

    /// Run retention for every task once
    pub async fn prune(&self) -> RetentionReport {
        self.inner
            .retention
            .sweep(&self.inner.registry.list(), Utc::now())
            .await
    }
}

fn defer_reason(error: &SchedulerError) -> DeferReason {
    match error {
        SchedulerError::LockUnavailable(_) => DeferReason::LockHeld,
        _ => DeferReason::LockError,
    }
}

// Delay until the next multiple of `period` since the epoch
fn until_next_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis().max(1);
    let now_ms = u128::try_from(now.timestamp_millis()).unwrap_or(0);
    let remainder = now_ms % period_ms;
    if remainder == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(u64::try_from(period_ms - remainder).unwrap_or(0))
    }
}

/// Builder for creating SchedulerEngine
pub struct SchedulerEngineBuilder {
    store: Option<Arc<SchedulerStore>>,
    config: SchedulerConfig,
    evaluator: ExpressionEvaluator,
    runner: Option<Arc<dyn CommandRunner>>,
    lock: Option<Arc<dyn LockService>>,
    maintenance: Option<Arc<dyn MaintenanceMode>>,
    events: Option<EventBus>,
}

impl SchedulerEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            store: None,
            config: SchedulerConfig::default(),
            evaluator: ExpressionEvaluator::default(),
            runner: None,
            lock: None,
            maintenance: None,
            events: None,
        }
    }

    /// Set the store
    pub fn store(mut self, store: Arc<SchedulerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the evaluator (and with it the default timezone)
    pub fn evaluator(mut self, evaluator: ExpressionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Set the command runner; defaults to [`ShellRunner`]
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set the cluster lock service
    pub fn lock_service(mut self, lock: Arc<dyn LockService>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Set the maintenance-mode source
    pub fn maintenance(mut self, maintenance: Arc<dyn MaintenanceMode>) -> Self {
        self.maintenance = Some(maintenance);
        self
    }

    /// Use an existing event bus
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the engine, loading the registry from the store
    pub async fn build(self) -> Result<SchedulerEngine> {
        let store = self
            .store
            .ok_or_else(|| SchedulerError::InvalidConfig("Store is required".to_string()))?;
        self.config.validate()?;

        let config = self.config;
        let events = self
            .events
            .unwrap_or_else(|| EventBus::new(config.event_capacity));
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(ShellRunner::default()));

        let registry = TaskRegistry::load(store.clone(), self.evaluator, Utc::now()).await?;
        let executor = Executor::new(runner, store.clone(), config.server_id.clone())
            .with_default_timeout(config.default_timeout)
            .with_max_output_bytes(config.max_output_bytes);
        let retention = Retention::new(store).with_events(events.clone());

        if self.lock.is_none() && registry.list().iter().any(|t| t.run_on_one_server) {
            warn!("Tasks request run_on_one_server but no lock service is configured");
        }

        Ok(SchedulerEngine {
            inner: Arc::new(EngineInner {
                workers: Arc::new(Semaphore::new(config.max_concurrent)),
                config,
                registry,
                executor,
                retention,
                events,
                lock: self.lock,
                maintenance: self.maintenance,
                tracker: TaskTracker::new(),
            }),
        })
    }
}

impl Default for SchedulerEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
