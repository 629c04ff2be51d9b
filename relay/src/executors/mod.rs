//! Executor abstraction.
//!
//! Each [`ExecutorKind`] has exactly one implementation slot in an
//! [`ExecutorSet`], filled once at startup. The engine looks executors up by
//! kind, never by name, so an unknown executor can only surface while a
//! pipeline is being bound. Tests fill the slots with scripted executors.

pub mod agent;
pub mod api;
pub mod shell;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::core::types::{ExecutorKind, GIT_DIFF_INPUT, InputFiles, Step};
use crate::io::config::RelayConfig;
use crate::io::credentials::CredentialProvider;

pub use agent::AgentExecutor;
pub use api::ApiExecutor;
pub use shell::ShellExecutor;

/// Everything an executor needs for one step.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub step: Step,
    /// Model with role placeholders already substituted; may be empty.
    pub model: String,
    /// Rendered system prompt; empty when the step names none.
    pub system_prompt: String,
    pub run_dir: PathBuf,
    /// Directory commands and agents run in.
    pub work_dir: PathBuf,
    pub inputs: InputFiles,
}

/// What an executor produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub output: String,
    /// USD; zero when unknown.
    pub cost: f64,
    pub duration: Duration,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Turns a request into a result.
pub trait Executor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult>;
}

/// One executor per [`ExecutorKind`].
pub struct ExecutorSet {
    api: Box<dyn Executor>,
    agent: Box<dyn Executor>,
    shell: Box<dyn Executor>,
}

impl ExecutorSet {
    pub fn new(
        api: Box<dyn Executor>,
        agent: Box<dyn Executor>,
        shell: Box<dyn Executor>,
    ) -> Self {
        Self { api, agent, shell }
    }

    /// Production executors built from configuration.
    pub fn from_config(cfg: &RelayConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Ok(Self::new(
            Box::new(ApiExecutor::new(&cfg.provider, credentials)?),
            Box::new(AgentExecutor::new(&cfg.executors.agent)),
            Box::new(ShellExecutor::new(&cfg.executors.shell)),
        ))
    }

    pub fn get(&self, kind: ExecutorKind) -> &dyn Executor {
        match kind {
            ExecutorKind::Api => self.api.as_ref(),
            ExecutorKind::Agent => self.agent.as_ref(),
            ExecutorKind::Shell => self.shell.as_ref(),
        }
    }
}

/// User message for model-backed executors.
///
/// Inputs appear in name order. The git diff becomes a fenced `diff` block and
/// is left out entirely when empty; every other input is a `## name` section.
pub fn build_user_content(inputs: &InputFiles) -> String {
    let mut out = String::new();
    for (name, content) in inputs {
        if name == GIT_DIFF_INPUT {
            if !content.is_empty() {
                out.push_str(&format!("## git diff\n\n```diff\n{content}\n```\n\n"));
            }
            continue;
        }
        out.push_str(&format!("## {name}\n\n{content}\n\n"));
    }
    out
}
