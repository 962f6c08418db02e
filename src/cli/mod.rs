//! CLI module for Novacron
//!
//! - `serve`: run the scheduler loop
//! - `task`: create, edit, run and inspect tasks
//! - `frequencies`: list the frequency catalog
//! - `prune`: apply every task's result cleanup policy once

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

pub mod task;

/// Novacron task scheduler CLI
#[derive(Parser, Debug)]
#[command(name = "novacron")]
#[command(about = "Cron-style task scheduler")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the scheduler (default)
    Serve,
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),
    /// List the frequency catalog
    Frequencies,
    /// Apply result cleanup policies now
    Prune,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    Add {
        /// Display label
        #[arg(long)]
        description: String,
        /// Command to run
        #[arg(long)]
        command: String,
        #[command(flatten)]
        definition: DefinitionArgs,
    },
    /// List tasks
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one task with its statistics
    Show {
        id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Edit a task; omitted options keep their current value
    Update {
        id: Uuid,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        command: Option<String>,
        #[command(flatten)]
        definition: DefinitionArgs,
    },
    /// Enable a task
    Enable { id: Uuid },
    /// Disable a task
    Disable { id: Uuid },
    /// Delete a task and its results
    Delete {
        id: Uuid,
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
    /// Run a task now, outside its schedule
    Run { id: Uuid },
    /// Show a task's results, newest first
    Results {
        id: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: i32,
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by `task add` and `task update`
#[derive(Args, Debug, Default)]
pub struct DefinitionArgs {
    /// Command parameters
    #[arg(long)]
    pub parameters: Option<String>,
    /// Cron expression (5 or 6 fields)
    #[arg(long, conflicts_with = "frequency")]
    pub cron: Option<String>,
    /// Frequency key, see `novacron frequencies`
    #[arg(long)]
    pub frequency: Option<String>,
    /// Frequency parameter, repeatable (e.g. --param 13:00)
    #[arg(long = "param", requires = "frequency")]
    pub frequency_parameters: Vec<String>,
    /// IANA timezone
    #[arg(long)]
    pub timezone: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub dont_overlap: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub run_in_maintenance: Option<bool>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub run_on_one_server: Option<bool>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub webhook: Option<String>,
    /// Delete results older than this many days (0 disables)
    #[arg(long, conflicts_with = "keep_results")]
    pub keep_days: Option<u32>,
    /// Keep only this many newest results (0 disables)
    #[arg(long)]
    pub keep_results: Option<u32>,
    /// Kill the command after this many seconds (0 uses the default)
    #[arg(long)]
    pub max_runtime: Option<u64>,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run().await,
        Some(Commands::Task(cmd)) => task::run(cmd).await,
        Some(Commands::Frequencies) => task::frequencies(),
        Some(Commands::Prune) => task::prune().await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
