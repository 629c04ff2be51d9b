//! Pipeline engine: runs bound steps in order against a live [`Run`].
//!
//! Steps run strictly sequentially with no retries. The first failure is
//! recorded on the run and ends execution; cancellation is only observed
//! between steps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::anyhow;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::budget::truncate_to_token_budget;
use crate::core::roles::{RolesConfig, display_label, resolve_model};
use crate::core::types::{BoundPipeline, BoundStep, ExecutorKind, StepStatus};
use crate::executors::{ExecRequest, ExecResult, ExecutorSet};
use crate::io::context::ContextResolver;
use crate::io::display::{Display, StepReport};
use crate::io::prompt::PromptLibrary;
use crate::io::run_store::{Run, StepResult};

/// Characters of step output shown as a preview.
const PREVIEW_CHARS: usize = 60;

/// Cooperative cancellation flag shared with whoever may request a stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why [`Engine::execute`] stopped early.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cancellation was requested before `next_step` started.
    #[error("cancelled before step {next_step:?}")]
    Cancelled { next_step: String },
    #[error("step {step:?} failed: {source:#}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Settings the engine reads from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub roles: RolesConfig,
    /// `<= 0` disables input budgeting.
    pub max_context_tokens: i64,
}

/// Borrowed collaborators for one pipeline execution.
pub struct Engine<'a> {
    pub settings: &'a EngineSettings,
    pub executors: &'a ExecutorSet,
    pub prompts: &'a PromptLibrary,
    pub resolver: &'a ContextResolver,
    pub display: &'a dyn Display,
    pub cancel: &'a CancelToken,
}

impl Engine<'_> {
    /// Execute every step of `pipeline`, recording results on `run`.
    ///
    /// Persistence failures are logged and do not stop the pipeline.
    #[instrument(skip_all, fields(pipeline = %pipeline.name, run_id = %run.id()))]
    pub fn execute(&self, pipeline: &BoundPipeline, run: &mut Run) -> Result<(), EngineError> {
        let started = Instant::now();
        for bound in &pipeline.steps {
            let step = &bound.step;
            if self.cancel.is_cancelled() {
                info!(next_step = %step.name, "cancellation requested");
                return Err(EngineError::Cancelled {
                    next_step: step.name.clone(),
                });
            }

            let label = display_label(&step.executor, bound.kind, &step.model, &self.settings.roles);
            let ticker = self.display.step_start(&step.name, &label);
            let step_started = Instant::now();
            let outcome = match bound.kind {
                Some(kind) => self.run_step(bound, kind, run),
                None => Err(anyhow!("step {:?} has no executor", step.name)),
            };
            let elapsed = step_started.elapsed();
            ticker.stop();

            let result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    let message = format!("{err:#}");
                    warn!(step = %step.name, error = %message, "step failed");
                    self.display.step_failed(&step.name, &label, &message);
                    record(
                        run,
                        StepResult {
                            name: step.name.clone(),
                            status: StepStatus::Failed,
                            cost: 0.0,
                            tokens_in: 0,
                            tokens_out: 0,
                            duration_ms: millis(elapsed),
                            error: message.clone(),
                        },
                    );
                    if let Err(persist) = run.fail(message.as_str()) {
                        warn!(err = %persist, "failed to mark run failed");
                    }
                    self.display.failed(&message);
                    return Err(EngineError::StepFailed {
                        step: step.name.clone(),
                        source: err,
                    });
                }
            };

            record(
                run,
                StepResult {
                    name: step.name.clone(),
                    status: StepStatus::Completed,
                    cost: result.cost,
                    tokens_in: result.tokens_in,
                    tokens_out: result.tokens_out,
                    duration_ms: millis(elapsed),
                    error: String::new(),
                },
            );

            let detail = if !step.output.is_empty() && !result.output.is_empty() {
                if let Err(err) = run.write_file(&step.output, &result.output) {
                    warn!(file = %step.output, err = %err, "failed to write step output");
                }
                step.output.clone()
            } else {
                format!("{:.0}s", elapsed.as_secs_f64())
            };
            let preview = preview_line(&result.output);
            self.display.step_done(&StepReport {
                name: &step.name,
                label: &label,
                detail: &detail,
                cost: result.cost,
                duration: elapsed,
                preview: preview.as_deref(),
            });
        }

        if let Err(err) = run.complete() {
            warn!(err = %err, "failed to mark run completed");
        }
        self.display.summary(run.meta().total_cost, started.elapsed());
        Ok(())
    }

    fn run_step(
        &self,
        bound: &BoundStep,
        kind: ExecutorKind,
        run: &Run,
    ) -> anyhow::Result<ExecResult> {
        let step = &bound.step;
        let mut model = resolve_model(&step.model, &self.settings.roles);
        if kind == ExecutorKind::Api && model.trim().is_empty() {
            model = self.settings.roles.planner.clone();
        }
        let system_prompt = if step.prompt_template.trim().is_empty() {
            String::new()
        } else {
            self.prompts.render(&step.prompt_template)?
        };

        let mut inputs = self.resolver.resolve_step(step)?;
        if kind == ExecutorKind::Api {
            inputs = truncate_to_token_budget(
                &inputs,
                &system_prompt,
                self.settings.max_context_tokens,
            );
        }
        debug!(step = %step.name, %kind, %model, inputs = inputs.len(), "dispatching step");

        let request = ExecRequest {
            step: step.clone(),
            model,
            system_prompt,
            run_dir: run.dir().to_path_buf(),
            work_dir: self.resolver.work_dir().to_path_buf(),
            inputs,
        };
        self.executors.get(kind).execute(&request)
    }
}

fn record(run: &mut Run, result: StepResult) {
    let name = result.name.clone();
    if let Err(err) = run.add_step_result(result) {
        warn!(step = %name, err = %err, "failed to save step result");
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// First non-empty line of `output`, shortened for display.
pub fn preview_line(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|line| !line.is_empty())?;
    if line.chars().count() <= PREVIEW_CHARS {
        return Some(line.to_string());
    }
    let mut short: String = line.chars().take(PREVIEW_CHARS - 1).collect();
    short.push('…');
    Some(short)
}
