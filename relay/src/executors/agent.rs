//! Delegated coding-agent executor (`claude -p`).

use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::executors::{ExecRequest, ExecResult, Executor, build_user_content};
use crate::io::config::AgentExecutorConfig;
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Deserialize)]
struct AgentEnvelope {
    #[serde(default)]
    result: String,
}

/// Runs the agent CLI in the project directory with the step inputs on stdin.
///
/// `command` may carry leading arguments (`npx claude`); relay's own flags
/// follow them.
pub struct AgentExecutor {
    command: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl AgentExecutor {
    pub fn new(cfg: &AgentExecutorConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn args(request: &ExecRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        if !request.model.trim().is_empty() {
            args.push("--model".to_string());
            args.push(request.model.clone());
        }
        if !request.system_prompt.trim().is_empty() {
            args.push("--system-prompt".to_string());
            args.push(request.system_prompt.clone());
        }
        args
    }
}

/// The agent's `{"result": ...}` envelope when present, else the raw output.
pub fn parse_agent_output(stdout: &str) -> String {
    match serde_json::from_str::<AgentEnvelope>(stdout.trim()) {
        Ok(envelope) if !envelope.result.is_empty() => envelope.result.trim().to_string(),
        _ => stdout.trim().to_string(),
    }
}

impl Executor for AgentExecutor {
    #[instrument(skip_all, fields(step = %request.step.name, command = %self.command))]
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult> {
        let start = Instant::now();
        let prompt = build_user_content(&request.inputs);
        let mut words = self.command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(words)
            .args(Self::args(request))
            .current_dir(&request.work_dir);

        info!(work_dir = %request.work_dir.display(), "starting agent");
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.command))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "agent timed out");
            return Err(anyhow!(
                "{} timed out after {}s\nstderr: {}",
                self.command,
                self.timeout.as_secs(),
                output.stderr_text().trim()
            ));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with status {:?}\nstderr: {}",
                self.command,
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        Ok(ExecResult {
            output: parse_agent_output(&output.stdout_text()),
            duration: start.elapsed(),
            ..ExecResult::default()
        })
    }
}
