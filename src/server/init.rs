//! Engine assembly and the serve loop

use std::sync::Arc;

use anyhow::{Context, Result};
use novacron_core::shutdown::cancel_on_signal;
use novacron_core::{
    ExpressionEvaluator, LockService, MaintenanceFile, MemoryLockService, RedisLockService,
    SchedulerEngine, SchedulerStore, ShellRunner,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::{AppConfig, LockBackend};
use super::loader::load_config;

/// Open the store and build an engine from configuration
pub async fn build_engine(config: &AppConfig) -> Result<SchedulerEngine> {
    config.validate()?;

    let db_path = config.scheduler.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create data directory")?;
    }
    let store = Arc::new(
        SchedulerStore::from_path(&db_path)
            .await
            .context("Failed to open scheduler database")?,
    );
    debug!(path = %db_path.display(), "Scheduler database opened");

    let evaluator = ExpressionEvaluator::from_timezone_name(&config.scheduler.timezone)
        .context("Invalid scheduler.timezone")?;

    let mut runner = ShellRunner::new(config.executor.shell.clone());
    let working_dir = config.executor.working_dir.trim();
    if !working_dir.is_empty() {
        runner = runner.with_working_dir(working_dir);
    }

    let lock: Arc<dyn LockService> = match config.lock.backend {
        LockBackend::Memory => Arc::new(MemoryLockService::new()),
        LockBackend::Redis => Arc::new(
            RedisLockService::new(&config.lock.redis_url)
                .context("Failed to configure Redis lock service")?,
        ),
    };

    let mut builder = SchedulerEngine::builder()
        .store(store)
        .config(config.scheduler.engine_config(&config.lock.key_prefix))
        .evaluator(evaluator)
        .runner(Arc::new(runner))
        .lock_service(lock);
    if let Some(flag_file) = config.maintenance.flag_file() {
        builder = builder.maintenance(Arc::new(MaintenanceFile::new(flag_file)));
    }

    builder.build().await.context("Failed to build scheduler engine")
}

/// Run the scheduler until Ctrl+C or SIGTERM
pub async fn run() -> Result<()> {
    info!("Starting Novacron v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    let engine = build_engine(&config).await?;
    info!(
        server_id = %engine.config().server_id,
        tasks = engine.list_tasks().len(),
        lock_backend = ?config.lock.backend,
        "Scheduler ready"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));
    tokio::spawn(log_notifications(engine.clone(), shutdown.clone()));

    engine.run(shutdown).await?;
    Ok(())
}

// Intents are logged for an external notifier to pick up
async fn log_notifications(engine: SchedulerEngine, shutdown: CancellationToken) {
    let mut notifications = engine.events().notifications();
    loop {
        tokio::select! {
            intent = notifications.recv() => match intent {
                Some(intent) => info!(
                    task_id = %intent.task_id,
                    status = %intent.result.status,
                    targets = ?intent.targets,
                    "Notification requested"
                ),
                None => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
}
