//! One full invocation: pipeline lookup, input, run provisioning, engine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::types::{BoundPipeline, GIT_DIFF_INPUT, PROJECT_CONTEXT_INPUT, RunStatus};
use crate::engine::{CancelToken, Engine, EngineError, EngineSettings};
use crate::executors::ExecutorSet;
use crate::io::config::RelayConfig;
use crate::io::context::{ContextResolver, PLAN_ARTIFACT};
use crate::io::display::Display;
use crate::io::git::Git;
use crate::io::pipeline::{load_pipeline, pipeline_dirs};
use crate::io::project::ProjectContext;
use crate::io::prompt::PromptLibrary;
use crate::io::run_store::{NewRun, Run};
use crate::io::source::InputSource;

/// Ticket file written into every run directory.
pub const TICKET_FILE: &str = "TICKET.md";
/// Error recorded on a run stopped by cancellation.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// `.relay/` under a project root.
pub fn relay_dir(root: &Path) -> PathBuf {
    root.join(".relay")
}

/// `.relay/runs/` under a project root.
pub fn runs_dir(root: &Path) -> PathBuf {
    relay_dir(root).join("runs")
}

/// What to run.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub root: PathBuf,
    pub source: InputSource,
    /// Overrides `default_pipeline` when set.
    pub pipeline: Option<String>,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub status: RunStatus,
    pub total_cost: f64,
    pub steps: usize,
}

/// Load and bind the requested pipeline. Fails before any run exists.
pub fn resolve_pipeline(root: &Path, cfg: &RelayConfig, name: Option<&str>) -> Result<BoundPipeline> {
    let name = name.unwrap_or(&cfg.default_pipeline);
    load_pipeline(&pipeline_dirs(root), name)?.bind()
}

/// Run one pipeline end to end.
///
/// Step failures and cancellation surface as an [`EngineError`] inside the
/// returned error; in both cases the run record is left `failed`.
pub fn run_session(
    request: &SessionRequest,
    cfg: &RelayConfig,
    executors: &ExecutorSet,
    display: &dyn Display,
    cancel: &CancelToken,
) -> Result<SessionOutcome> {
    let root = request.root.as_path();
    let pipeline = resolve_pipeline(root, cfg, request.pipeline.as_deref())?;
    let input = request.source.fetch()?;

    let git = Git::new(root);
    let needs = |virtual_input: &str| {
        pipeline
            .steps
            .iter()
            .any(|bound| bound.step.input.iter().any(|name| name == virtual_input))
    };
    let git_diff = if needs(GIT_DIFF_INPUT) {
        git.diff_or_empty()
    } else {
        String::new()
    };
    let project = if needs(PROJECT_CONTEXT_INPUT) {
        ProjectContext::scan(root, &cfg.project_context)
    } else {
        ProjectContext::default()
    };

    let mut run = Run::create(
        &runs_dir(root),
        NewRun {
            mode: input.mode.as_str().to_string(),
            reference: input.reference.clone(),
            slug: input.slug.clone(),
            git: git.snapshot(),
        },
    )?;
    if let Err(err) = run.write_file(TICKET_FILE, &input.ticket()) {
        let message = format!("{err:#}");
        if let Err(persist) = run.fail(message.as_str()) {
            warn!(err = %persist, "failed to mark run failed");
        }
        return Err(err).context("write ticket");
    }
    info!(run_id = %run.id(), pipeline = %pipeline.name, "starting session");

    let resolver = ContextResolver::new(run.dir(), root, git_diff, project);
    let prompts = PromptLibrary::new(root, &cfg.language.artifacts);
    let settings = EngineSettings {
        roles: cfg.roles.clone(),
        max_context_tokens: cfg.max_context_tokens,
    };
    let engine = Engine {
        settings: &settings,
        executors,
        prompts: &prompts,
        resolver: &resolver,
        display,
        cancel,
    };

    display.header(&input.title);
    match engine.execute(&pipeline, &mut run) {
        Ok(()) => {}
        Err(err @ EngineError::Cancelled { .. }) => {
            if let Err(persist) = run.fail(CANCELLED_MESSAGE) {
                warn!(err = %persist, "failed to mark run cancelled");
            }
            display.failed(CANCELLED_MESSAGE);
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    }

    publish_plan(root, &run);
    let meta = run.meta();
    Ok(SessionOutcome {
        run_id: run.id().to_string(),
        run_dir: run.dir().to_path_buf(),
        status: meta.status,
        total_cost: meta.total_cost,
        steps: meta.steps.len(),
    })
}

/// Copy the run's plan to `.relay/PLAN.md` for easy access.
fn publish_plan(root: &Path, run: &Run) {
    let Ok(plan) = run.read_file(PLAN_ARTIFACT) else {
        return;
    };
    let target = relay_dir(root).join(PLAN_ARTIFACT);
    if let Err(err) = fs::write(&target, plan) {
        warn!(path = %target.display(), err = %err, "failed to publish plan");
    }
}
