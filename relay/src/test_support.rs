//! Test-only helpers: scripted executors, a recording display, step builders.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::Step;
use crate::engine::CancelToken;
use crate::executors::{ExecRequest, ExecResult, Executor, ExecutorSet};
use crate::io::display::{Display, StepReport, StepTicker};

/// Replays queued results and records every request it sees.
///
/// Clones share the same queue and log, so a test can keep one handle while
/// the [`ExecutorSet`] owns another. With nothing queued it answers
/// `"<step> output"` at zero cost.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    replies: Arc<Mutex<VecDeque<std::result::Result<ExecResult, String>>>>,
    requests: Arc<Mutex<Vec<ExecRequest>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, output: &str, cost: f64) -> &Self {
        self.push(Ok(ExecResult {
            output: output.to_string(),
            cost,
            ..ExecResult::default()
        }))
    }

    pub fn push_error(&self, message: &str) -> &Self {
        self.push(Err(message.to_string()))
    }

    fn push(&self, reply: std::result::Result<ExecResult, String>) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn step_names(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.step.name)
            .collect()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecResult> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(ExecResult {
                output: format!("{} output", request.step.name),
                duration: Duration::from_millis(1),
                ..ExecResult::default()
            }),
        }
    }
}

/// One scripted executor per kind.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutors {
    pub api: ScriptedExecutor,
    pub agent: ScriptedExecutor,
    pub shell: ScriptedExecutor,
}

impl ScriptedExecutors {
    pub fn new() -> Self {
        Self::default()
    }

    /// An [`ExecutorSet`] sharing state with these handles.
    pub fn set(&self) -> ExecutorSet {
        ExecutorSet::new(
            Box::new(self.api.clone()),
            Box::new(self.agent.clone()),
            Box::new(self.shell.clone()),
        )
    }
}

/// A display notification, as captured by [`RecordingDisplay`].
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Header(String),
    StepStart { name: String, label: String },
    StepDone { name: String, detail: String, cost: f64 },
    StepFailed { name: String, error: String },
    Summary { total_cost: f64 },
    Failed(String),
}

/// Captures notifications; optionally requests cancellation once a named
/// step finishes.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    events: Mutex<Vec<DisplayEvent>>,
    cancel_after: Option<(String, CancelToken)>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(step: &str, token: CancelToken) -> Self {
        Self {
            events: Mutex::default(),
            cancel_after: Some((step.to_string(), token)),
        }
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: DisplayEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Display for RecordingDisplay {
    fn header(&self, title: &str) {
        self.record(DisplayEvent::Header(title.to_string()));
    }

    fn step_start(&self, name: &str, label: &str) -> StepTicker {
        self.record(DisplayEvent::StepStart {
            name: name.to_string(),
            label: label.to_string(),
        });
        StepTicker::idle()
    }

    fn step_done(&self, report: &StepReport<'_>) {
        self.record(DisplayEvent::StepDone {
            name: report.name.to_string(),
            detail: report.detail.to_string(),
            cost: report.cost,
        });
        if let Some((step, token)) = &self.cancel_after
            && step == report.name
        {
            token.cancel();
        }
    }

    fn step_failed(&self, name: &str, _label: &str, error: &str) {
        self.record(DisplayEvent::StepFailed {
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    fn summary(&self, total_cost: f64, _total: Duration) {
        self.record(DisplayEvent::Summary { total_cost });
    }

    fn failed(&self, error: &str) {
        self.record(DisplayEvent::Failed(error.to_string()));
    }
}

/// A step with only a name and executor set.
pub fn step(name: &str, executor: &str) -> Step {
    Step {
        name: name.to_string(),
        executor: executor.to_string(),
        ..Step::default()
    }
}

/// An API step reading `inputs` and writing `output`.
pub fn api_step(name: &str, inputs: &[&str], output: &str) -> Step {
    Step {
        model: "test/model".to_string(),
        input: inputs.iter().map(|input| input.to_string()).collect(),
        output: output.to_string(),
        ..step(name, "api")
    }
}

pub fn shell_step(name: &str, command: &str, output: &str) -> Step {
    Step {
        command: command.to_string(),
        output: output.to_string(),
        ..step(name, "shell")
    }
}

/// A scratch project root with an empty `.relay/` directory.
pub fn temp_project() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    fs::create_dir_all(temp.path().join(".relay")).unwrap();
    temp
}

/// Write `.relay/pipelines/<name>.toml` under `root`.
pub fn write_pipeline(root: &Path, name: &str, toml: &str) {
    let dir = root.join(".relay").join("pipelines");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}.toml")), toml).unwrap();
}
