//! Pipeline and step definitions plus executor binding.
//!
//! A [`Pipeline`] is what configuration declares. Before anything runs it is
//! bound into a [`BoundPipeline`], which resolves every executor name to a
//! closed [`ExecutorKind`] so that unknown executors surface as configuration
//! errors before the first step starts.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Resolved step inputs keyed by input name.
///
/// A sorted map keeps prompt assembly and token truncation deterministic.
pub type InputFiles = BTreeMap<String, String>;

/// Virtual input resolved from the precomputed git diff.
pub const GIT_DIFF_INPUT: &str = "git:diff";
/// Virtual input resolved from the aggregated project context.
pub const PROJECT_CONTEXT_INPUT: &str = "project:context";

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One declared unit of pipeline work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    /// Display and result key; unique within a pipeline.
    pub name: String,
    /// Executor name (`api`, `claude-code`, `shell`).
    pub executor: String,
    /// Literal model id or a role placeholder such as `$planner`.
    pub model: String,
    /// Name of the system-prompt asset.
    pub prompt_template: String,
    /// Filenames or virtual inputs (`git:diff`, `project:context`).
    pub input: Vec<String>,
    /// Filename the textual result is persisted under.
    pub output: String,
    /// Raw shell command (shell executor only).
    pub command: String,
}

/// Closed set of executor implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// Remote chat-completion call.
    Api,
    /// Delegated coding-agent CLI.
    Agent,
    /// Raw shell command.
    Shell,
}

impl ExecutorKind {
    /// Resolve a configured executor name. Empty names resolve to `None`.
    pub fn parse(name: &str) -> Result<Option<Self>> {
        match name.trim() {
            "" => Ok(None),
            "api" => Ok(Some(Self::Api)),
            "claude-code" | "agent" => Ok(Some(Self::Agent)),
            "shell" => Ok(Some(Self::Shell)),
            other => Err(anyhow!("unknown executor {other:?}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Agent => "claude-code",
            Self::Shell => "shell",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step whose executor name has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStep {
    pub step: Step,
    /// `None` when the step declares no executor; dispatching it fails the run.
    pub kind: Option<ExecutorKind>,
}

/// A pipeline whose steps are all bound to known executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPipeline {
    pub name: String,
    pub steps: Vec<BoundStep>,
}

impl Pipeline {
    /// Resolve every step's executor, collecting all binding errors at once.
    pub fn bind(self) -> Result<BoundPipeline> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("pipeline must have a name"));
        }
        let mut errors = Vec::new();
        let mut steps = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            match ExecutorKind::parse(&step.executor) {
                Ok(kind) => {
                    if kind == Some(ExecutorKind::Shell) && step.command.trim().is_empty() {
                        errors.push(format!("step {:?}: shell executor requires a command", step.name));
                    }
                    steps.push(BoundStep { step, kind });
                }
                Err(err) => errors.push(format!("step {:?}: {err}", step.name)),
            }
        }
        if !errors.is_empty() {
            return Err(anyhow!(
                "pipeline {:?} is invalid:\n- {}",
                self.name,
                errors.join("\n- ")
            ));
        }
        Ok(BoundPipeline {
            name: self.name,
            steps,
        })
    }
}

/// Lifecycle status of a run. `Running` is the only initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of one recorded step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, executor: &str) -> Step {
        Step {
            name: name.to_string(),
            executor: executor.to_string(),
            ..Step::default()
        }
    }

    #[test]
    fn parses_known_executor_names() {
        assert_eq!(ExecutorKind::parse("api").unwrap(), Some(ExecutorKind::Api));
        assert_eq!(
            ExecutorKind::parse("claude-code").unwrap(),
            Some(ExecutorKind::Agent)
        );
        assert_eq!(ExecutorKind::parse("shell").unwrap(), Some(ExecutorKind::Shell));
        assert_eq!(ExecutorKind::parse("").unwrap(), None);
        assert!(ExecutorKind::parse("github-pr").is_err());
    }

    #[test]
    fn bind_reports_every_invalid_step() {
        let pipeline = Pipeline {
            name: "p".to_string(),
            steps: vec![
                step("Plan", "api"),
                step("Mystery", "telepathy"),
                step("Test", "shell"),
            ],
        };
        let err = pipeline.bind().unwrap_err().to_string();
        assert!(err.contains("unknown executor \"telepathy\""));
        assert!(err.contains("shell executor requires a command"));
    }

    #[test]
    fn bind_keeps_empty_executor_for_dispatch_time_failure() {
        let pipeline = Pipeline {
            name: "p".to_string(),
            steps: vec![step("Orphan", "")],
        };
        let bound = pipeline.bind().expect("bind");
        assert_eq!(bound.steps[0].kind, None);
    }

    #[test]
    fn bind_rejects_unnamed_pipeline() {
        let pipeline = Pipeline {
            name: " ".to_string(),
            steps: Vec::new(),
        };
        assert!(pipeline.bind().is_err());
    }

    #[test]
    fn empty_pipeline_binds() {
        let pipeline = Pipeline {
            name: "empty".to_string(),
            steps: Vec::new(),
        };
        assert!(pipeline.bind().expect("bind").steps.is_empty());
    }

    #[test]
    fn run_status_serializes_lowercase() {
        let json = serde_json::to_string(&RunStatus::Completed).expect("serialize");
        assert_eq!(json, "\"completed\"");
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
