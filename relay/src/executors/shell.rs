//! Shell command executor.

use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::executors::{ExecRequest, ExecResult, Executor};
use crate::io::config::ShellExecutorConfig;
use crate::io::process::run_command_with_timeout;

/// Runs `sh -c <command>` in the project directory.
pub struct ShellExecutor {
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ShellExecutor {
    pub fn new(cfg: &ShellExecutorConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }
}

impl Executor for ShellExecutor {
    #[instrument(skip_all, fields(step = %request.step.name))]
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult> {
        let start = Instant::now();
        let command = request.step.command.as_str();
        if command.trim().is_empty() {
            return Err(anyhow!(
                "no command specified for shell step {:?}",
                request.step.name
            ));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&request.work_dir);
        debug!(command, "running shell step");
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run shell command {command:?}"))?;

        let mut text = output.stdout_text();
        if !output.stderr.is_empty() {
            text.push_str("\n--- stderr ---\n");
            text.push_str(&output.stderr_text());
        }

        if output.timed_out {
            return Err(anyhow!(
                "shell command {command:?} timed out after {:?}\noutput: {text}",
                self.timeout
            ));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "shell command {command:?} failed with status {:?}\noutput: {text}",
                output.status.code()
            ));
        }

        Ok(ExecResult {
            output: text,
            duration: start.elapsed(),
            ..ExecResult::default()
        })
    }
}
