use super::SchedulerStore;
use crate::error::Result;
use crate::task::{ExecutionResult, ResultRow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Aggregates over the retained results of one task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultStats {
    /// Number of retained results
    pub count: i64,
    /// Mean duration in milliseconds
    pub average_runtime_ms: Option<f64>,
    /// Start of the newest result
    pub last_started_at: Option<DateTime<Utc>>,
}

impl SchedulerStore {
    /// Append an execution result
    pub async fn append_result(&self, result: &ExecutionResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_results (
                id, task_id, due_at, started_at, duration_ms, status, exit_code, output, server_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.id.to_string())
        .bind(result.task_id.to_string())
        .bind(result.due_at)
        .bind(result.started_at)
        .bind(result.duration_ms)
        .bind(result.status.as_str())
        .bind(result.exit_code)
        .bind(&result.output)
        .bind(&result.server_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Newest-first results for a task
    pub async fn get_task_results(&self, task_id: Uuid, limit: i32) -> Result<Vec<ExecutionResult>> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            "SELECT * FROM task_results WHERE task_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(task_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// The most recent result for a task
    pub async fn latest_result(&self, task_id: Uuid) -> Result<Option<ExecutionResult>> {
        let row: Option<ResultRow> = sqlx::query_as(
            "SELECT * FROM task_results WHERE task_id = ? ORDER BY started_at DESC, id DESC LIMIT 1",
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    /// Count and mean runtime of a task's retained results
    pub async fn result_stats(&self, task_id: Uuid) -> Result<ResultStats> {
        let (count, average_runtime_ms): (i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), AVG(duration_ms) FROM task_results WHERE task_id = ?",
        )
        .bind(task_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let last_started_at = self.latest_result(task_id).await?.map(|r| r.started_at);

        Ok(ResultStats {
            count,
            average_runtime_ms,
            last_started_at,
        })
    }

    /// Delete results started before `cutoff`, always sparing the newest one.
    ///
    /// Returns the number of deleted rows.
    pub async fn delete_results_older_than(
        &self,
        task_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM task_results
            WHERE task_id = ?
              AND started_at < ?
              AND id NOT IN (
                  SELECT id FROM task_results
                  WHERE task_id = ?
                  ORDER BY started_at DESC, id DESC
                  LIMIT 1
              )
            "#,
        )
        .bind(task_id.to_string())
        .bind(cutoff)
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Keep only the newest `keep` results of a task.
    ///
    /// Returns the number of deleted rows.
    pub async fn keep_latest_results(&self, task_id: Uuid, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM task_results
            WHERE task_id = ?
              AND id NOT IN (
                  SELECT id FROM task_results
                  WHERE task_id = ?
                  ORDER BY started_at DESC, id DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(task_id.to_string())
        .bind(task_id.to_string())
        .bind(i64::from(keep))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
