//! Task, execution-result, and related domain types

#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::schedule::Schedule;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{11,13}$").expect("phone pattern is valid"));

/// Derived run status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Never ran, or waiting for its next run
    #[default]
    Idle,
    /// At least one execution in flight
    Running,
    /// Last execution succeeded
    Succeeded,
    /// Last execution failed or timed out
    Failed,
}

impl TaskStatus {
    /// Storage representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(SchedulerError::validation(
                "status",
                format!("unknown task status '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which retention rule applies to a task's results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupType {
    /// Drop results older than `threshold` days
    #[default]
    Days,
    /// Keep only the newest `threshold` results
    Results,
}

/// Automatic result cleanup policy. A threshold of 0 disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoCleanup {
    /// Cleanup mode
    #[serde(rename = "type")]
    pub kind: CleanupType,
    /// Days or result count, depending on `kind`
    pub threshold: u32,
}

impl AutoCleanup {
    /// Remove results older than `days` days
    #[must_use]
    pub fn by_age(days: u32) -> Self {
        Self {
            kind: CleanupType::Days,
            threshold: days,
        }
    }

    /// Keep the newest `count` results
    #[must_use]
    pub fn by_count(count: u32) -> Self {
        Self {
            kind: CleanupType::Results,
            threshold: count,
        }
    }

    /// Whether cleanup is switched on
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }
}

/// Where to send notification intents for a task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationTargets {
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number, digits only including country code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Webhook URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
}

impl NotificationTargets {
    /// Whether no target is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.webhook.is_none()
    }

    /// Trim every target and treat blank ones as absent
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            email: clean(self.email),
            phone: clean(self.phone),
            webhook: clean(self.webhook),
        }
    }

    /// Validate each configured target independently
    pub fn validate(&self) -> Result<()> {
        if let Some(email) = &self.email {
            if !EMAIL_RE.is_match(email) {
                return Err(SchedulerError::validation(
                    "notification_email",
                    format!("'{}' is not an email address", email),
                ));
            }
        }

        if let Some(phone) = &self.phone {
            if !PHONE_RE.is_match(phone) {
                return Err(SchedulerError::validation(
                    "notification_phone",
                    "must be 11 to 13 digits including country code",
                ));
            }
        }

        if let Some(webhook) = &self.webhook {
            let url = url::Url::parse(webhook).map_err(|e| {
                SchedulerError::validation("notification_webhook", e.to_string())
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SchedulerError::validation(
                    "notification_webhook",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
        }

        Ok(())
    }
}

/// A configured scheduling unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,
    /// Display label
    pub description: String,
    /// Command identifier, resolved by the hosting environment
    pub command: String,
    /// Free-form parameter string passed to the command
    pub parameters: Option<String>,
    /// When the task fires
    pub schedule: Schedule,
    /// IANA timezone; `None` uses the evaluator default
    pub timezone: Option<String>,
    /// Never start a run while a previous one is active
    pub dont_overlap: bool,
    /// Keep running while the host is in maintenance mode
    pub run_in_maintenance: bool,
    /// At most one server in the fleet runs each due time
    pub run_on_one_server: bool,
    /// Notification targets
    pub notifications: NotificationTargets,
    /// Result retention policy
    pub auto_cleanup: AutoCleanup,
    /// Per-task timeout overriding the configured default
    pub max_runtime_secs: Option<u64>,
    /// Inactive tasks are never scheduled
    pub is_active: bool,
    /// Derived run status
    pub status: TaskStatus,
    /// Start of the most recent run
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next due instant
    pub next_run_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last change to the definition or activation
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every write, run state included
    #[serde(default)]
    pub revision: i64,
}

impl Task {
    /// Create an active, idle task with default flags
    pub fn new(description: impl Into<String>, command: impl Into<String>, schedule: Schedule) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            command: command.into(),
            parameters: None,
            schedule,
            timezone: None,
            dont_overlap: false,
            run_in_maintenance: false,
            run_on_one_server: false,
            notifications: NotificationTargets::default(),
            auto_cleanup: AutoCleanup::default(),
            max_runtime_secs: None,
            is_active: true,
            status: TaskStatus::Idle,
            last_run_at: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Display label for the schedule, "<description> - <interval>" for frequencies
    #[must_use]
    pub fn schedule_label(&self) -> String {
        match &self.schedule {
            Schedule::Frequency { interval, .. } => format!("{} - {}", self.description, interval),
            Schedule::Cron { expression } => expression.clone(),
        }
    }

    /// Command line handed to the runner
    #[must_use]
    pub fn command_line(&self) -> String {
        match &self.parameters {
            Some(params) => format!("{} {}", self.command, params),
            None => self.command.clone(),
        }
    }
}

/// Task definition as submitted by the administrative layer.
///
/// The schedule arrives as the two independent inputs a form offers;
/// the registry folds them into a [`Schedule`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Display label
    pub description: String,
    /// Command identifier
    pub command: String,
    /// Command parameters
    #[serde(default)]
    pub parameters: Option<String>,
    /// Cron expression input
    #[serde(default)]
    pub expression: Option<String>,
    /// Frequency key input
    #[serde(default)]
    pub frequency: Option<String>,
    /// Frequency parameters
    #[serde(default)]
    pub frequency_parameters: Vec<String>,
    /// IANA timezone
    #[serde(default)]
    pub timezone: Option<String>,
    /// See [`Task::dont_overlap`]
    #[serde(default)]
    pub dont_overlap: bool,
    /// See [`Task::run_in_maintenance`]
    #[serde(default)]
    pub run_in_maintenance: bool,
    /// See [`Task::run_on_one_server`]
    #[serde(default)]
    pub run_on_one_server: bool,
    /// Notification targets
    #[serde(default)]
    pub notifications: NotificationTargets,
    /// Retention policy
    #[serde(default)]
    pub auto_cleanup: AutoCleanup,
    /// Per-task timeout
    #[serde(default)]
    pub max_runtime_secs: Option<u64>,
}

impl TaskDraft {
    /// Create a draft with a description and command
    pub fn new(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            command: command.into(),
            ..Self::default()
        }
    }

    /// Schedule with a cron expression
    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self.frequency = None;
        self.frequency_parameters.clear();
        self
    }

    /// Schedule with a catalog frequency
    pub fn with_frequency(mut self, interval: impl Into<String>) -> Self {
        self.frequency = Some(interval.into());
        self.expression = None;
        self
    }

    /// Set frequency parameters
    pub fn with_frequency_parameters(mut self, parameters: Vec<String>) -> Self {
        self.frequency_parameters = parameters;
        self
    }

    /// Set command parameters
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }

    /// Set timezone
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Forbid overlapping runs
    pub fn dont_overlap(mut self) -> Self {
        self.dont_overlap = true;
        self
    }

    /// Keep running in maintenance mode
    pub fn run_in_maintenance(mut self) -> Self {
        self.run_in_maintenance = true;
        self
    }

    /// Run on a single server per due time
    pub fn run_on_one_server(mut self) -> Self {
        self.run_on_one_server = true;
        self
    }

    /// Set notification targets
    pub fn with_notifications(mut self, notifications: NotificationTargets) -> Self {
        self.notifications = notifications;
        self
    }

    /// Set retention policy
    pub fn with_auto_cleanup(mut self, auto_cleanup: AutoCleanup) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }

    /// Set per-task timeout
    pub fn with_max_runtime(mut self, secs: u64) -> Self {
        self.max_runtime_secs = Some(secs);
        self
    }

    /// Draft reflecting an existing task, for partial edits
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        let (expression, frequency, frequency_parameters) = match &task.schedule {
            Schedule::Cron { expression } => (Some(expression.clone()), None, Vec::new()),
            Schedule::Frequency {
                interval,
                parameters,
            } => (None, Some(interval.clone()), parameters.clone()),
        };

        Self {
            description: task.description.clone(),
            command: task.command.clone(),
            parameters: task.parameters.clone(),
            expression,
            frequency,
            frequency_parameters,
            timezone: task.timezone.clone(),
            dont_overlap: task.dont_overlap,
            run_in_maintenance: task.run_in_maintenance,
            run_on_one_server: task.run_on_one_server,
            notifications: task.notifications.clone(),
            auto_cleanup: task.auto_cleanup,
            max_runtime_secs: task.max_runtime_secs,
        }
    }
}

/// Immutable view of a task taken at dispatch time.
///
/// Edits made while the run is in flight do not reach it.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Task as it was when dispatched
    pub task: Task,
    /// The due instant this run serves
    pub due_at: DateTime<Utc>,
}

impl TaskSnapshot {
    /// Take a snapshot for the given due instant
    #[must_use]
    pub fn new(task: Task, due_at: DateTime<Utc>) -> Self {
        Self { task, due_at }
    }
}

/// Terminal status of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Exit code 0
    Success,
    /// Non-zero exit or spawn failure
    Failure,
    /// Killed after exceeding its maximum runtime
    Timeout,
}

impl ExecutionStatus {
    /// Storage representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }

    /// Whether this is a successful run
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "timeout" => Ok(Self::Timeout),
            other => Err(SchedulerError::validation(
                "status",
                format!("unknown execution status '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One task run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result ID
    pub id: Uuid,
    /// Task that ran
    pub task_id: Uuid,
    /// Due instant the run served
    pub due_at: DateTime<Utc>,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: i64,
    /// Terminal status
    pub status: ExecutionStatus,
    /// Process exit code, when the process exited on its own
    pub exit_code: Option<i32>,
    /// Captured stdout and stderr
    pub output: String,
    /// Server that ran it
    pub server_id: String,
}

impl ExecutionResult {
    /// End of the run window
    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::milliseconds(self.duration_ms)
    }

    /// Whether two runs' `[start, finish)` windows intersect
    #[must_use]
    pub fn overlaps(&self, other: &ExecutionResult) -> bool {
        self.started_at < other.finished_at() && other.started_at < self.finished_at()
    }
}

/// What the executor did with a dispatched snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The command ran to a terminal status
    Completed(ExecutionResult),
    /// A run of the same `dont_overlap` task was already active
    SkippedOverlap,
}

impl ExecutionOutcome {
    /// The result, if the command ran
    #[must_use]
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::SkippedOverlap => None,
        }
    }
}

/// Read model for the administrative layer
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    /// The task, including derived status and next run
    #[serde(flatten)]
    pub task: Task,
    /// Mean duration of retained results
    pub average_runtime_ms: Option<f64>,
    /// Start of the most recent retained result
    pub last_result_at: Option<DateTime<Utc>>,
    /// Number of retained results
    pub result_count: i64,
}

/// Internal row type for task queries
#[derive(FromRow)]
pub(crate) struct TaskRow {
    pub id: String,
    pub description: String,
    pub command: String,
    pub parameters: Option<String>,
    pub schedule_json: String,
    pub timezone: Option<String>,
    pub dont_overlap: bool,
    pub run_in_maintenance: bool,
    pub run_on_one_server: bool,
    pub notifications_json: String,
    pub cleanup_type: String,
    pub cleanup_threshold: i64,
    pub max_runtime_secs: Option<i64>,
    pub is_active: bool,
    pub status: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = SchedulerError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let kind = match row.cleanup_type.as_str() {
            "days" => CleanupType::Days,
            "results" => CleanupType::Results,
            other => {
                return Err(SchedulerError::InvalidConfig(format!(
                    "Invalid cleanup type: {}",
                    other
                )))
            }
        };

        Ok(Task {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| SchedulerError::InvalidConfig(format!("Invalid task ID: {}", e)))?,
            description: row.description,
            command: row.command,
            parameters: row.parameters,
            schedule: serde_json::from_str(&row.schedule_json)?,
            timezone: row.timezone,
            dont_overlap: row.dont_overlap,
            run_in_maintenance: row.run_in_maintenance,
            run_on_one_server: row.run_on_one_server,
            notifications: serde_json::from_str(&row.notifications_json)?,
            auto_cleanup: AutoCleanup {
                kind,
                threshold: u32::try_from(row.cleanup_threshold).unwrap_or(0),
            },
            max_runtime_secs: row.max_runtime_secs.and_then(|v| u64::try_from(v).ok()),
            is_active: row.is_active,
            status: row.status.parse()?,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            revision: row.revision,
        })
    }
}

/// Internal row type for result queries
#[derive(FromRow)]
pub(crate) struct ResultRow {
    pub id: String,
    pub task_id: String,
    pub due_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: String,
    pub exit_code: Option<i32>,
    pub output: String,
    pub server_id: String,
}

impl TryFrom<ResultRow> for ExecutionResult {
    type Error = SchedulerError;

    fn try_from(row: ResultRow) -> Result<Self> {
        Ok(ExecutionResult {
            id: Uuid::parse_str(&row.id).map_err(|e| {
                SchedulerError::InvalidConfig(format!("Invalid result ID: {}", e))
            })?,
            task_id: Uuid::parse_str(&row.task_id)
                .map_err(|e| SchedulerError::InvalidConfig(format!("Invalid task ID: {}", e)))?,
            due_at: row.due_at,
            started_at: row.started_at,
            duration_ms: row.duration_ms,
            status: row.status.parse()?,
            exit_code: row.exit_code,
            output: row.output,
            server_id: row.server_id,
        })
    }
}
