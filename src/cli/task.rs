//! Task CLI commands
//!
//! `novacron task add|list|show|update|enable|disable|delete|run|results`

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use novacron_core::{
    frequencies as catalog, AutoCleanup, CleanupType, ExecutionOutcome, ExecutionResult,
    SchedulerEngine, TaskDraft, TaskView,
};
use uuid::Uuid;

use super::{DefinitionArgs, TaskCommands};
use crate::server::{build_engine, load_config};

/// Run a task subcommand
pub async fn run(cmd: TaskCommands) -> Result<()> {
    let engine = open_engine().await?;

    match cmd {
        TaskCommands::Add {
            description,
            command,
            definition,
        } => {
            let draft = apply_definition(TaskDraft::new(description, command), definition);
            let task = engine.add_task(draft).await?;
            println!("Created task {}", task.id);
            println!("  Next run: {}", format_time(task.next_run_at));
        }
        TaskCommands::List { json } => {
            let views = engine.list_task_views().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                print_task_table(&views);
            }
        }
        TaskCommands::Show { id, json } => {
            let view = engine.task_view(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_task_detail(&view);
            }
        }
        TaskCommands::Update {
            id,
            description,
            command,
            definition,
        } => {
            let current = engine.get_task(id)?;
            let mut draft = TaskDraft::from_task(&current);
            if let Some(description) = description {
                draft.description = description;
            }
            if let Some(command) = command {
                draft.command = command;
            }
            let task = engine
                .update_task(id, apply_definition(draft, definition))
                .await?;
            println!("Updated task {}", task.id);
            println!("  Next run: {}", format_time(task.next_run_at));
        }
        TaskCommands::Enable { id } => {
            let task = engine.set_task_enabled(id, true).await?;
            println!("Enabled {} (next run {})", task.id, format_time(task.next_run_at));
        }
        TaskCommands::Disable { id } => {
            let task = engine.set_task_enabled(id, false).await?;
            println!("Disabled {}", task.id);
        }
        TaskCommands::Delete { id, force } => {
            let task = engine.get_task(id)?;
            if !force && !confirm(&format!("Delete '{}' and all its results?", task.description)) {
                println!("Cancelled.");
                return Ok(());
            }
            engine.remove_task(id).await?;
            println!("Deleted task {id}");
        }
        TaskCommands::Run { id } => run_now(&engine, id).await?,
        TaskCommands::Results { id, limit, json } => {
            let results = engine.task_results(id, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
    }

    Ok(())
}

/// Print the frequency catalog
pub fn frequencies() -> Result<()> {
    println!("{:<22} {:<28} PARAMETERS", "INTERVAL", "LABEL");
    for frequency in catalog() {
        println!(
            "{:<22} {:<28} {}",
            frequency.interval,
            frequency.label,
            frequency.parameters.join(", ")
        );
    }
    Ok(())
}

/// Apply cleanup policies once
pub async fn prune() -> Result<()> {
    let engine = open_engine().await?;
    let report = engine.prune().await;
    println!(
        "Checked {} tasks, deleted {} results, {} failures",
        report.tasks_checked, report.deleted, report.failures
    );
    Ok(())
}

async fn open_engine() -> Result<SchedulerEngine> {
    let config = load_config().context("Failed to load configuration")?;
    build_engine(&config).await
}

async fn run_now(engine: &SchedulerEngine, id: Uuid) -> Result<()> {
    match engine.execute_now(id).await? {
        ExecutionOutcome::Completed(result) => {
            println!(
                "{} in {} ms (exit code {})",
                result.status,
                result.duration_ms,
                result
                    .exit_code
                    .map_or_else(|| "-".to_string(), |c| c.to_string())
            );
            if !result.output.is_empty() {
                println!("{}", result.output.trim_end());
            }
        }
        ExecutionOutcome::SkippedOverlap => {
            println!("Skipped: a previous run of this task is still in progress");
        }
    }
    Ok(())
}

fn apply_definition(mut draft: TaskDraft, args: DefinitionArgs) -> TaskDraft {
    if let Some(parameters) = args.parameters {
        draft.parameters = Some(parameters);
    }
    if let Some(expression) = args.cron {
        draft = draft.with_cron(expression);
    }
    if let Some(frequency) = args.frequency {
        draft = draft
            .with_frequency(frequency)
            .with_frequency_parameters(args.frequency_parameters);
    }
    if let Some(timezone) = args.timezone {
        draft.timezone = Some(timezone);
    }
    if let Some(value) = args.dont_overlap {
        draft.dont_overlap = value;
    }
    if let Some(value) = args.run_in_maintenance {
        draft.run_in_maintenance = value;
    }
    if let Some(value) = args.run_on_one_server {
        draft.run_on_one_server = value;
    }
    if let Some(email) = args.email {
        draft.notifications.email = Some(email);
    }
    if let Some(phone) = args.phone {
        draft.notifications.phone = Some(phone);
    }
    if let Some(webhook) = args.webhook {
        draft.notifications.webhook = Some(webhook);
    }
    if let Some(days) = args.keep_days {
        draft.auto_cleanup = AutoCleanup::by_age(days);
    }
    if let Some(count) = args.keep_results {
        draft.auto_cleanup = AutoCleanup::by_count(count);
    }
    if let Some(secs) = args.max_runtime {
        draft.max_runtime_secs = Some(secs);
    }
    draft
}

fn print_task_table(views: &[TaskView]) {
    if views.is_empty() {
        println!("No tasks configured.");
        println!("  Create one:");
        println!("    novacron task add --description \"Nightly backup\" --command backup.sh --frequency daily");
        return;
    }

    println!(
        "{:<36}  {:<24} {:<28} {:<10} {:<20} {:>8}",
        "ID", "DESCRIPTION", "SCHEDULE", "STATUS", "NEXT RUN", "AVG MS"
    );
    for view in views {
        let task = &view.task;
        let status = if task.is_active {
            task.status.to_string()
        } else {
            "disabled".to_string()
        };
        println!(
            "{:<36}  {:<24} {:<28} {:<10} {:<20} {:>8}",
            task.id,
            truncate(&task.description, 24),
            truncate(&task.schedule.to_string(), 28),
            status,
            format_time(task.next_run_at),
            view.average_runtime_ms
                .map_or_else(|| "-".to_string(), |ms| format!("{ms:.0}"))
        );
    }
}

fn print_task_detail(view: &TaskView) {
    let task = &view.task;
    println!("{}", task.schedule_label());
    println!("  ID:           {}", task.id);
    println!("  Command:      {}", task.command_line());
    println!("  Schedule:     {}", task.schedule);
    println!(
        "  Timezone:     {}",
        task.timezone.as_deref().unwrap_or("(default)")
    );
    println!("  Active:       {}", task.is_active);
    println!("  Status:       {}", task.status);
    println!("  Last run:     {}", format_time(task.last_run_at));
    println!("  Next run:     {}", format_time(task.next_run_at));
    println!(
        "  Flags:        dont_overlap={} run_in_maintenance={} run_on_one_server={}",
        task.dont_overlap, task.run_in_maintenance, task.run_on_one_server
    );
    if task.auto_cleanup.is_enabled() {
        let unit = match task.auto_cleanup.kind {
            CleanupType::Days => "days",
            CleanupType::Results => "results",
        };
        println!("  Cleanup:      keep {} {}", task.auto_cleanup.threshold, unit);
    }
    if let Some(secs) = task.max_runtime_secs {
        println!("  Max runtime:  {secs}s");
    }
    println!("  Results:      {}", view.result_count);
    if let Some(avg) = view.average_runtime_ms {
        println!("  Avg runtime:  {avg:.0} ms");
    }
}

fn print_results(results: &[ExecutionResult]) {
    if results.is_empty() {
        println!("No results recorded.");
        return;
    }
    for result in results {
        println!(
            "{}  {:<8} {:>7} ms  exit {:<4} on {}",
            result.started_at.format("%Y-%m-%d %H:%M:%S"),
            result.status.as_str(),
            result.duration_ms,
            result
                .exit_code
                .map_or_else(|| "-".to_string(), |c| c.to_string()),
            result.server_id
        );
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M UTC").to_string(),
    )
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}

fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};
    print!("{prompt} [y/N] ");
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_ok() {
        matches!(input.trim(), "y" | "Y" | "yes" | "YES")
    } else {
        false
    }
}
