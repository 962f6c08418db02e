use sqlx::Row;

use super::SchedulerStore;
use crate::error::Result;

impl SchedulerStore {
    /// Run database migrations
    pub(super) async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                command TEXT NOT NULL,
                parameters TEXT,
                schedule_json TEXT NOT NULL,
                timezone TEXT,
                dont_overlap BOOLEAN NOT NULL DEFAULT FALSE,
                run_in_maintenance BOOLEAN NOT NULL DEFAULT FALSE,
                run_on_one_server BOOLEAN NOT NULL DEFAULT FALSE,
                notifications_json TEXT NOT NULL DEFAULT '{}',
                cleanup_type TEXT NOT NULL DEFAULT 'days',
                cleanup_threshold INTEGER NOT NULL DEFAULT 0,
                max_runtime_secs INTEGER,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                status TEXT NOT NULL DEFAULT 'idle',
                last_run_at TIMESTAMP,
                next_run_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_results (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                due_at TIMESTAMP NOT NULL,
                started_at TIMESTAMP NOT NULL,
                duration_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                exit_code INTEGER,
                output TEXT NOT NULL DEFAULT '',
                server_id TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_active_next_run ON tasks(is_active, next_run_at)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_results_task_started ON task_results(task_id, started_at)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.ensure_revision_column().await
    }

    // Databases created before tasks carried a revision
    async fn ensure_revision_column(&self) -> Result<()> {
        let columns = sqlx::query("PRAGMA table_info(tasks)")
            .fetch_all(&self.pool)
            .await?;

        let has_revision = columns.iter().any(|row| {
            let name: String = row.try_get("name").unwrap_or_default();
            name == "revision"
        });

        if !has_revision {
            sqlx::query("ALTER TABLE tasks ADD COLUMN revision INTEGER NOT NULL DEFAULT 0")
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}
