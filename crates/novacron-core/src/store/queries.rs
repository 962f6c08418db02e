use super::SchedulerStore;
use crate::error::{Result, SchedulerError};
use crate::task::{CleanupType, Task, TaskRow, TaskStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

fn cleanup_type_name(kind: CleanupType) -> &'static str {
    match kind {
        CleanupType::Days => "days",
        CleanupType::Results => "results",
    }
}

impl SchedulerStore {
    /// Create a new task
    pub async fn create_task(&self, task: &Task) -> Result<()> {
        let schedule_json = serde_json::to_string(&task.schedule)?;
        let notifications_json = serde_json::to_string(&task.notifications)?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, description, command, parameters, schedule_json, timezone,
                dont_overlap, run_in_maintenance, run_on_one_server, notifications_json,
                cleanup_type, cleanup_threshold, max_runtime_secs, is_active, status,
                last_run_at, next_run_at, created_at, updated_at, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.description)
        .bind(&task.command)
        .bind(&task.parameters)
        .bind(schedule_json)
        .bind(&task.timezone)
        .bind(task.dont_overlap)
        .bind(task.run_in_maintenance)
        .bind(task.run_on_one_server)
        .bind(notifications_json)
        .bind(cleanup_type_name(task.auto_cleanup.kind))
        .bind(i64::from(task.auto_cleanup.threshold))
        .bind(task.max_runtime_secs.map(|v| v as i64))
        .bind(task.is_active)
        .bind(task.status.as_str())
        .bind(task.last_run_at)
        .bind(task.next_run_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.revision)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: Uuid) -> Result<Task> {
        let row: TaskRow = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SchedulerError::TaskNotFound(id))?;

        row.try_into()
    }

    /// Update the administrative columns of a task and its next run.
    ///
    /// Status and last run belong to the scheduler and are left alone.
    /// Returns the stored row with its new revision.
    pub async fn update_task(&self, task: &Task) -> Result<Task> {
        let schedule_json = serde_json::to_string(&task.schedule)?;
        let notifications_json = serde_json::to_string(&task.notifications)?;

        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            UPDATE tasks SET
                description = ?, command = ?, parameters = ?, schedule_json = ?, timezone = ?,
                dont_overlap = ?, run_in_maintenance = ?, run_on_one_server = ?,
                notifications_json = ?, cleanup_type = ?, cleanup_threshold = ?,
                max_runtime_secs = ?, is_active = ?, next_run_at = ?, updated_at = ?,
                revision = revision + 1
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(&task.description)
        .bind(&task.command)
        .bind(&task.parameters)
        .bind(schedule_json)
        .bind(&task.timezone)
        .bind(task.dont_overlap)
        .bind(task.run_in_maintenance)
        .bind(task.run_on_one_server)
        .bind(notifications_json)
        .bind(cleanup_type_name(task.auto_cleanup.kind))
        .bind(i64::from(task.auto_cleanup.threshold))
        .bind(task.max_runtime_secs.map(|v| v as i64))
        .bind(task.is_active)
        .bind(task.next_run_at)
        .bind(task.updated_at)
        .bind(task.id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(SchedulerError::TaskNotFound(task.id))?.try_into()
    }

    /// Update only the scheduler-owned columns of a task.
    ///
    /// Administrative columns, `updated_at` included, are left alone so a
    /// concurrent edit survives a completing run. A task disabled in the
    /// meantime keeps a null next run. Returns the stored row.
    pub async fn update_run_state(
        &self,
        id: Uuid,
        status: TaskStatus,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Task> {
        let row: Option<TaskRow> = sqlx::query_as(
            r#"
            UPDATE tasks SET
                status = ?,
                last_run_at = ?,
                next_run_at = CASE WHEN is_active THEN ? ELSE NULL END,
                revision = revision + 1
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(last_run_at)
        .bind(next_run_at)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(SchedulerError::TaskNotFound(id))?.try_into()
    }

    /// Delete a task together with its results
    pub async fn delete_task(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM task_results WHERE task_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskNotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    /// List all tasks in registry order (oldest first)
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}
