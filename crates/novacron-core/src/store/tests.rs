use super::*;
use crate::schedule::Schedule;
use crate::task::{AutoCleanup, ExecutionResult, ExecutionStatus, Task, TaskStatus};
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

struct TestContext {
    store: SchedulerStore,
    _dir: TempDir,
}

async fn create_test_context() -> TestContext {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_novacron.db");
    let store = SchedulerStore::from_path(&path).await.unwrap();
    TestContext { store, _dir: dir }
}

fn result_for(task_id: Uuid, started_secs: i64, duration_ms: i64) -> ExecutionResult {
    let started_at = Utc.timestamp_opt(1_700_000_000 + started_secs, 0).unwrap();
    ExecutionResult {
        id: Uuid::new_v4(),
        task_id,
        due_at: started_at,
        started_at,
        duration_ms,
        status: ExecutionStatus::Success,
        exit_code: Some(0),
        output: "ok".to_string(),
        server_id: "node-a".to_string(),
    }
}

#[tokio::test]
async fn test_create_and_get_task() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let mut task = Task::new("Backup", "backup:run", Schedule::frequency("daily"));
    task.auto_cleanup = AutoCleanup::by_count(5);
    task.max_runtime_secs = Some(120);
    store.create_task(&task).await.unwrap();

    let retrieved = store.get_task(task.id).await.unwrap();
    assert_eq!(retrieved.id, task.id);
    assert_eq!(retrieved.description, "Backup");
    assert_eq!(retrieved.schedule, Schedule::frequency("daily"));
    assert_eq!(retrieved.auto_cleanup, AutoCleanup::by_count(5));
    assert_eq!(retrieved.max_runtime_secs, Some(120));
    assert_eq!(retrieved.status, TaskStatus::Idle);
}

#[tokio::test]
async fn test_get_missing_task() {
    let ctx = create_test_context().await;
    let result = ctx.store.get_task(Uuid::new_v4()).await;
    assert!(matches!(result, Err(SchedulerError::TaskNotFound(_))));
}

#[tokio::test]
async fn test_update_task() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let mut task = Task::new("Report", "report:send", Schedule::cron("0 9 * * 1"));
    store.create_task(&task).await.unwrap();

    task.description = "Weekly report".to_string();
    task.is_active = false;
    task.status = TaskStatus::Running;
    let updated = store.update_task(&task).await.unwrap();
    assert_eq!(updated.revision, 1);

    let retrieved = store.get_task(task.id).await.unwrap();
    assert_eq!(retrieved, updated);
    assert_eq!(retrieved.description, "Weekly report");
    assert!(!retrieved.is_active);
    // run state is not part of an administrative write
    assert_eq!(retrieved.status, TaskStatus::Idle);

    let ghost = Task::new("Ghost", "noop", Schedule::frequency("hourly"));
    assert!(matches!(
        store.update_task(&ghost).await,
        Err(SchedulerError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_update_run_state_leaves_definition_alone() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let mut task = Task::new("Sync", "sync:all", Schedule::frequency("everyFiveMinutes"));
    task.updated_at = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
    store.create_task(&task).await.unwrap();

    let last = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let next = Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap();
    let returned = store
        .update_run_state(task.id, TaskStatus::Succeeded, Some(last), Some(next))
        .await
        .unwrap();

    let retrieved = store.get_task(task.id).await.unwrap();
    assert_eq!(retrieved, returned);
    assert_eq!(retrieved.status, TaskStatus::Succeeded);
    assert_eq!(retrieved.last_run_at, Some(last));
    assert_eq!(retrieved.next_run_at, Some(next));
    assert_eq!(
        retrieved.updated_at,
        Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap()
    );
    assert_eq!(retrieved.revision, 1);
    assert_eq!(retrieved.description, "Sync");

    // an inactive task never gets a next run back
    task.is_active = false;
    store.update_task(&task).await.unwrap();
    let disabled = store
        .update_run_state(task.id, TaskStatus::Failed, Some(last), Some(next))
        .await
        .unwrap();
    assert_eq!(disabled.next_run_at, None);
    assert_eq!(disabled.revision, 3);

    assert!(matches!(
        store
            .update_run_state(Uuid::new_v4(), TaskStatus::Idle, None, None)
            .await,
        Err(SchedulerError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_task_removes_results() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let task = Task::new("Cleanup", "cache:clear", Schedule::frequency("hourly"));
    store.create_task(&task).await.unwrap();
    store.append_result(&result_for(task.id, 0, 10)).await.unwrap();

    store.delete_task(task.id).await.unwrap();

    assert!(matches!(
        store.get_task(task.id).await,
        Err(SchedulerError::TaskNotFound(_))
    ));
    assert!(store.get_task_results(task.id, 10).await.unwrap().is_empty());
    assert!(matches!(
        store.delete_task(task.id).await,
        Err(SchedulerError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_list_tasks_in_creation_order() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut ids = Vec::new();
    for i in 0..3 {
        let mut task = Task::new(format!("task-{}", i), "noop", Schedule::frequency("hourly"));
        task.created_at = base + Duration::minutes(i);
        store.create_task(&task).await.unwrap();
        ids.push(task.id);
    }

    let all: Vec<Uuid> = store.list_tasks().await.unwrap().iter().map(|t| t.id).collect();
    assert_eq!(all, ids);
}

#[tokio::test]
async fn test_results_newest_first_and_stats() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let task = Task::new("Index", "search:index", Schedule::frequency("hourly"));
    store.create_task(&task).await.unwrap();

    for (offset, duration) in [(0, 100), (60, 200), (120, 300)] {
        store
            .append_result(&result_for(task.id, offset, duration))
            .await
            .unwrap();
    }

    let results = store.get_task_results(task.id, 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].duration_ms, 300);
    assert_eq!(results[1].duration_ms, 200);

    let stats = store.result_stats(task.id).await.unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.average_runtime_ms, Some(200.0));
    assert_eq!(stats.last_started_at, Some(results[0].started_at));

    let empty = store.result_stats(Uuid::new_v4()).await.unwrap();
    assert_eq!(empty, ResultStats::default());
}

#[tokio::test]
async fn test_delete_results_older_than_spares_latest() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let task = Task::new("Old", "noop", Schedule::frequency("daily"));
    store.create_task(&task).await.unwrap();
    store.append_result(&result_for(task.id, 0, 1)).await.unwrap();
    store.append_result(&result_for(task.id, 10, 1)).await.unwrap();

    // Cutoff after every result: only the newest survives
    let cutoff = Utc.timestamp_opt(1_700_100_000, 0).unwrap();
    let deleted = store
        .delete_results_older_than(task.id, cutoff)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let remaining = store.get_task_results(task.id, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(
        remaining[0].started_at,
        Utc.timestamp_opt(1_700_000_010, 0).unwrap()
    );
}

#[tokio::test]
async fn test_keep_latest_results() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let task = Task::new("Many", "noop", Schedule::frequency("everyMinute"));
    store.create_task(&task).await.unwrap();
    for i in 0..5 {
        store
            .append_result(&result_for(task.id, i * 60, 1))
            .await
            .unwrap();
    }

    let deleted = store.keep_latest_results(task.id, 2).await.unwrap();
    assert_eq!(deleted, 3);

    let remaining = store.get_task_results(task.id, 10).await.unwrap();
    let offsets: Vec<i64> = remaining
        .iter()
        .map(|r| r.started_at.timestamp() - 1_700_000_000)
        .collect();
    assert_eq!(offsets, vec![240, 180]);
}
