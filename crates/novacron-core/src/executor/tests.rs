use super::*;
use crate::schedule::Schedule;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};

/// Runner that returns a canned reply
struct StubRunner {
    reply: std::result::Result<CommandOutput, String>,
    delay: Option<Duration>,
}

impl StubRunner {
    fn exit(code: i32, output: &str) -> Self {
        Self {
            reply: Ok(CommandOutput {
                exit_code: Some(code),
                output: output.to_string(),
            }),
            delay: None,
        }
    }

    fn spawn_error(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::exit(0, "done")
        }
    }
}

#[async_trait]
impl CommandRunner for StubRunner {
    async fn run(&self, _command: &str, _parameters: Option<&str>) -> Result<CommandOutput> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .map_err(SchedulerError::ExecutionFailed)
    }
}

/// Runner that blocks until the test hands out a permit
struct GatedRunner {
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl CommandRunner for GatedRunner {
    async fn run(&self, _command: &str, _parameters: Option<&str>) -> Result<CommandOutput> {
        let _ = self.started.send(());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| SchedulerError::ExecutionFailed(e.to_string()))?;
        permit.forget();
        Ok(CommandOutput {
            exit_code: Some(0),
            output: String::new(),
        })
    }
}

struct TestContext {
    store: Arc<SchedulerStore>,
    task: Task,
    _dir: TempDir,
}

fn due() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 10, 5, 0).unwrap()
}

async fn create_test_context(dont_overlap: bool) -> TestContext {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        SchedulerStore::from_path(&dir.path().join("executor.db"))
            .await
            .unwrap(),
    );
    let mut task = Task::new("Job", "job:run", Schedule::frequency("everyFiveMinutes"));
    task.dont_overlap = dont_overlap;
    store.create_task(&task).await.unwrap();
    TestContext {
        store,
        task,
        _dir: dir,
    }
}

fn executor(ctx: &TestContext, runner: impl CommandRunner + 'static) -> Executor {
    Executor::new(Arc::new(runner), ctx.store.clone(), "node-a")
}

#[tokio::test]
async fn test_success_is_recorded_before_returning() {
    let ctx = create_test_context(false).await;
    let executor = executor(&ctx, StubRunner::exit(0, "hello"));

    let outcome = executor
        .execute(&TaskSnapshot::new(ctx.task.clone(), due()))
        .await
        .unwrap();
    let result = outcome.result().unwrap();

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output, "hello");
    assert_eq!(result.due_at, due());
    assert_eq!(result.server_id, "node-a");
    assert!(result.duration_ms >= 0);

    let stored = ctx.store.get_task_results(ctx.task.id, 10).await.unwrap();
    assert_eq!(stored, vec![result.clone()]);
    assert!(!executor.is_running(ctx.task.id));
}

#[tokio::test]
async fn test_non_zero_exit_is_failure() {
    let ctx = create_test_context(false).await;
    let executor = executor(&ctx, StubRunner::exit(2, "boom"));

    let outcome = executor
        .execute(&TaskSnapshot::new(ctx.task.clone(), due()))
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.status, ExecutionStatus::Failure);
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.output, "boom");
}

#[tokio::test]
async fn test_spawn_error_is_captured() {
    let ctx = create_test_context(false).await;
    let executor = executor(&ctx, StubRunner::spawn_error("no such command"));

    let outcome = executor
        .execute(&TaskSnapshot::new(ctx.task.clone(), due()))
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.status, ExecutionStatus::Failure);
    assert_eq!(result.exit_code, None);
    assert!(result.output.contains("no such command"));
}

#[tokio::test]
async fn test_default_timeout() {
    let ctx = create_test_context(false).await;
    let executor = executor(&ctx, StubRunner::slow(Duration::from_secs(30)))
        .with_default_timeout(Some(Duration::from_millis(100)));

    let outcome = executor
        .execute(&TaskSnapshot::new(ctx.task.clone(), due()))
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(result.duration_ms < 30_000);
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_runner_killed_on_timeout() {
    let ctx = create_test_context(false).await;
    let executor = executor(&ctx, ShellRunner::default())
        .with_default_timeout(Some(Duration::from_millis(300)));

    let mut task = ctx.task.clone();
    task.command = "sleep".to_string();
    task.parameters = Some("30".to_string());

    let started = std::time::Instant::now();
    let outcome = executor.execute(&TaskSnapshot::new(task, due())).await.unwrap();
    assert_eq!(outcome.result().unwrap().status, ExecutionStatus::Timeout);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_dont_overlap_skips_second_run() {
    let ctx = create_test_context(true).await;
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let executor = Arc::new(executor(
        &ctx,
        GatedRunner {
            gate: gate.clone(),
            started: started_tx,
        },
    ));

    let first = {
        let executor = executor.clone();
        let snapshot = TaskSnapshot::new(ctx.task.clone(), due());
        tokio::spawn(async move { executor.execute(&snapshot).await })
    };
    started_rx.recv().await.unwrap();
    assert!(executor.is_running(ctx.task.id));

    let second = executor
        .execute(&TaskSnapshot::new(ctx.task.clone(), due()))
        .await
        .unwrap();
    assert_eq!(second, ExecutionOutcome::SkippedOverlap);

    gate.add_permits(1);
    let first = first.await.unwrap().unwrap();
    assert!(first.result().is_some());
    assert!(!executor.is_running(ctx.task.id));

    // Only the first run left a result
    assert_eq!(ctx.store.get_task_results(ctx.task.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_overlap_allowed_without_flag() {
    let ctx = create_test_context(false).await;
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let executor = Arc::new(executor(
        &ctx,
        GatedRunner {
            gate: gate.clone(),
            started: started_tx,
        },
    ));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let executor = executor.clone();
            let snapshot = TaskSnapshot::new(ctx.task.clone(), due());
            tokio::spawn(async move { executor.execute(&snapshot).await })
        })
        .collect();
    started_rx.recv().await.unwrap();
    started_rx.recv().await.unwrap();
    assert_eq!(executor.running_count(ctx.task.id), 2);

    gate.add_permits(2);
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().result().is_some());
    }
    assert_eq!(executor.running_count(ctx.task.id), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_runner_output_and_exit_code() {
    let runner = ShellRunner::default();

    let out = runner
        .run("echo", Some("out; echo err 1>&2; exit 3"))
        .await
        .unwrap();
    assert_eq!(out.exit_code, Some(3));
    assert!(!out.success());
    assert_eq!(out.output, "out\nerr\n");

    let dir = TempDir::new().unwrap();
    let runner = ShellRunner::new("/bin/sh").with_working_dir(dir.path());
    let out = runner.run("pwd", None).await.unwrap();
    assert!(out.success());
    assert!(out.output.trim_end().ends_with(
        dir.path().file_name().unwrap().to_str().unwrap()
    ));
}

#[test]
fn test_truncate_output() {
    assert_eq!(truncate_output("short".to_string(), 10), "short");

    let truncated = truncate_output("abcdefghij".to_string(), 4);
    assert_eq!(truncated, format!("abcd{}", TRUNCATION_MARKER));

    // never splits a multi-byte character
    let truncated = truncate_output("ééé".to_string(), 3);
    assert_eq!(truncated, format!("é{}", TRUNCATION_MARKER));
}
