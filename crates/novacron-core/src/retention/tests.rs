use super::*;
use crate::schedule::Schedule;
use crate::task::{AutoCleanup, ExecutionResult, ExecutionStatus};
use chrono::TimeZone;
use tempfile::TempDir;
use uuid::Uuid;

struct TestContext {
    store: Arc<SchedulerStore>,
    _dir: TempDir,
}

async fn create_test_context() -> TestContext {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        SchedulerStore::from_path(&dir.path().join("retention.db"))
            .await
            .unwrap(),
    );
    TestContext { store, _dir: dir }
}

fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, n, 12, 0, 0).unwrap()
}

async fn task_with_results(
    store: &SchedulerStore,
    policy: AutoCleanup,
    days: &[u32],
) -> Task {
    let mut task = Task::new("Retained", "noop", Schedule::frequency("daily"));
    task.auto_cleanup = policy;
    store.create_task(&task).await.unwrap();

    for d in days {
        store
            .append_result(&ExecutionResult {
                id: Uuid::new_v4(),
                task_id: task.id,
                due_at: day(*d),
                started_at: day(*d),
                duration_ms: 5,
                status: ExecutionStatus::Success,
                exit_code: Some(0),
                output: String::new(),
                server_id: "node-a".to_string(),
            })
            .await
            .unwrap();
    }
    task
}

async fn remaining_days(store: &SchedulerStore, task: &Task) -> Vec<u32> {
    use chrono::Datelike;
    store
        .get_task_results(task.id, 100)
        .await
        .unwrap()
        .iter()
        .map(|r| r.started_at.day())
        .collect()
}

#[tokio::test]
async fn test_by_count_keeps_newest() {
    let ctx = create_test_context().await;
    let retention = Retention::new(ctx.store.clone());

    let task = task_with_results(&ctx.store, AutoCleanup::by_count(3), &[1, 2, 3, 4, 5]).await;
    assert_eq!(retention.apply(&task, day(10)).await.unwrap(), 2);
    assert_eq!(remaining_days(&ctx.store, &task).await, vec![5, 4, 3]);

    // fewer results than the threshold: nothing to do
    let few = task_with_results(&ctx.store, AutoCleanup::by_count(3), &[1, 2]).await;
    assert_eq!(retention.apply(&few, day(10)).await.unwrap(), 0);
    assert_eq!(remaining_days(&ctx.store, &few).await, vec![2, 1]);
}

#[tokio::test]
async fn test_by_age() {
    let ctx = create_test_context().await;
    let retention = Retention::new(ctx.store.clone());

    let task = task_with_results(&ctx.store, AutoCleanup::by_age(7), &[1, 5, 9, 12]).await;
    // cutoff is March 8th 12:00
    assert_eq!(retention.apply(&task, day(15)).await.unwrap(), 2);
    assert_eq!(remaining_days(&ctx.store, &task).await, vec![12, 9]);
}

#[tokio::test]
async fn test_by_age_spares_latest_result() {
    let ctx = create_test_context().await;
    let retention = Retention::new(ctx.store.clone());

    let task = task_with_results(&ctx.store, AutoCleanup::by_age(1), &[1, 2]).await;
    assert_eq!(retention.apply(&task, day(28)).await.unwrap(), 1);
    assert_eq!(remaining_days(&ctx.store, &task).await, vec![2]);
}

#[tokio::test]
async fn test_zero_threshold_disables() {
    let ctx = create_test_context().await;
    let retention = Retention::new(ctx.store.clone());

    for policy in [AutoCleanup::by_age(0), AutoCleanup::by_count(0)] {
        let task = task_with_results(&ctx.store, policy, &[1, 2, 3]).await;
        assert_eq!(retention.apply(&task, day(28)).await.unwrap(), 0);
        assert_eq!(remaining_days(&ctx.store, &task).await.len(), 3);
    }
}

#[tokio::test]
async fn test_sweep_publishes_and_reports() {
    let ctx = create_test_context().await;
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let retention = Retention::new(ctx.store.clone()).with_events(bus);

    let trimmed = task_with_results(&ctx.store, AutoCleanup::by_count(1), &[1, 2, 3]).await;
    let untouched = task_with_results(&ctx.store, AutoCleanup::default(), &[1, 2, 3]).await;

    let report = retention
        .sweep(&[trimmed.clone(), untouched.clone()], day(10))
        .await;
    assert_eq!(
        report,
        RetentionReport {
            tasks_checked: 1,
            deleted: 2,
            failures: 0,
        }
    );

    match rx.recv().await.unwrap() {
        SchedulerEvent::RetentionApplied { task_id, deleted } => {
            assert_eq!(task_id, trimmed.id);
            assert_eq!(deleted, 2);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_sweep_isolates_failures() {
    let ctx = create_test_context().await;
    let retention = Retention::new(ctx.store.clone());

    let task = task_with_results(&ctx.store, AutoCleanup::by_count(1), &[1, 2]).await;
    ctx.store.close().await;

    let report = retention.sweep(&[task], day(10)).await;
    assert_eq!(report.failures, 1);
    assert_eq!(report.deleted, 0);
}
