use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Result, SchedulerError};

/// What a finished command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    /// Whether the command exited with code 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Resolves and runs a task's command in the hosting environment.
///
/// Implementations must stop the command when the returned future is
/// dropped; the executor relies on that to enforce timeouts.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` with its free-form parameter string
    async fn run(&self, command: &str, parameters: Option<&str>) -> Result<CommandOutput>;
}

/// Runs commands through a POSIX shell (`sh -c "<command> <parameters>"`)
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    working_dir: Option<PathBuf>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            working_dir: None,
        }
    }
}

impl ShellRunner {
    /// Create a runner using the given shell
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            working_dir: None,
        }
    }

    /// Run commands from this directory instead of the current one
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, parameters: Option<&str>) -> Result<CommandOutput> {
        let line = match parameters {
            Some(params) => format!("{} {}", command, params),
            None => command.to_string(),
        };

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&line);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| SchedulerError::ExecutionFailed(format!("failed to spawn '{}': {}", line, e)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SchedulerError::ExecutionFailed(e.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(CommandOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}
