//! Error types for novacron-core
//!
//! Validation errors surface synchronously to the caller at task-save time.
//! Execution-time failures are captured into [`crate::ExecutionResult`]
//! instead of being returned from the tick loop.

use thiserror::Error;
use uuid::Uuid;

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Scheduler error types
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Cron expression failed to parse
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidExpression {
        /// The rejected expression
        expression: String,
        /// Parser message
        reason: String,
    },

    /// Frequency key is not part of the catalog
    #[error("unknown frequency: {0}")]
    UnknownFrequency(String),

    /// Frequency parameters are missing or out of range
    #[error("invalid parameters for frequency '{interval}': {reason}")]
    InvalidFrequencyParameters {
        /// Frequency key
        interval: String,
        /// What was wrong
        reason: String,
    },

    /// Both (or neither) of cron expression and frequency were supplied
    #[error("schedule conflict: {0}")]
    ScheduleConflict(String),

    /// Timezone is not a known IANA identifier
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Field-level validation failure
    #[error("invalid {field}: {message}")]
    Validation {
        /// Field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Cluster lock held by another server
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    /// Lock backend could not be reached
    #[error("lock service error: {0}")]
    LockService(String),

    /// Command exceeded its maximum runtime
    #[error("execution timed out after {0} seconds")]
    ExecutionTimeout(u64),

    /// Command could not be started or exited non-zero
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Retention sweep failed
    #[error("retention error: {0}")]
    RetentionIo(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchedulerError {
    /// Shorthand for a [`SchedulerError::Validation`] error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Errors that only mean "not this tick"
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockUnavailable(_) | Self::LockService(_))
    }

    /// Errors caused by the submitted task definition
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidExpression { .. }
                | Self::UnknownFrequency(_)
                | Self::InvalidFrequencyParameters { .. }
                | Self::ScheduleConflict(_)
                | Self::InvalidTimezone(_)
                | Self::Validation { .. }
        )
    }
}
