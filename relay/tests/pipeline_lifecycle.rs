//! End-to-end session runs against scripted executors.

use std::fs;
use std::path::{Path, PathBuf};

use relay::core::budget::{CHARS_PER_TOKEN, TRUNCATION_MARKER};
use relay::core::types::{RunStatus, StepStatus};
use relay::engine::{CancelToken, EngineError};
use relay::executors::{ExecutorSet, ShellExecutor};
use relay::io::config::{RelayConfig, ShellExecutorConfig};
use relay::io::run_store::{META_FILE, Meta, load_meta, read_latest};
use relay::io::source::InputSource;
use relay::session::{SessionOutcome, SessionRequest, run_session, runs_dir};
use relay::test_support::{
    DisplayEvent, RecordingDisplay, ScriptedExecutors, temp_project, write_pipeline,
};

const PLAN_REVIEW: &str = r#"
name = "plan-review"

[[steps]]
name = "Plan"
executor = "api"
model = "$planner"
prompt_template = "plan"
input = ["TICKET.md"]
output = "PLAN.md"

[[steps]]
name = "Review"
executor = "api"
model = "$reviewer"
prompt_template = "review"
input = ["TICKET.md", "PLAN.md"]
output = "REVIEW.md"
"#;

const THREE_STEPS: &str = r#"
name = "three"

[[steps]]
name = "Plan"
executor = "api"
model = "test/planner"
input = ["TICKET.md"]
output = "PLAN.md"

[[steps]]
name = "Review"
executor = "api"
model = "test/reviewer"
input = ["PLAN.md"]
output = "REVIEW.md"

[[steps]]
name = "Revise"
executor = "api"
model = "test/editor"
input = ["PLAN.md", "REVIEW.md"]
output = "PLAN.md"
"#;

fn request(root: &Path, pipeline: &str) -> SessionRequest {
    SessionRequest {
        root: root.to_path_buf(),
        source: InputSource::Prompt("Add a login page".to_string()),
        pipeline: Some(pipeline.to_string()),
    }
}

fn latest_run(root: &Path) -> (PathBuf, Meta) {
    let runs = runs_dir(root);
    let id = read_latest(&runs).expect("read latest").expect("latest run");
    let dir = runs.join(id);
    let meta = load_meta(&dir.join(META_FILE)).expect("load meta");
    (dir, meta)
}

fn run(
    root: &Path,
    pipeline: &str,
    executors: &ExecutorSet,
    display: &RecordingDisplay,
    cancel: &CancelToken,
) -> anyhow::Result<SessionOutcome> {
    run_session(
        &request(root, pipeline),
        &RelayConfig::default(),
        executors,
        display,
        cancel,
    )
}

#[test]
fn two_step_pipeline_completes_and_records_artifacts() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(root, "plan-review", PLAN_REVIEW);

    let scripted = ScriptedExecutors::new();
    scripted
        .api
        .push_output("## Summary\nAdd the page", 0.0)
        .push_output("Looks fine", 0.0);
    let display = RecordingDisplay::new();

    let outcome = run(root, "plan-review", &scripted.set(), &display, &CancelToken::new())
        .expect("session");

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.steps, 2);
    assert_eq!(outcome.total_cost, 0.0);

    let (dir, meta) = latest_run(root);
    assert_eq!(dir, outcome.run_dir);
    assert_eq!(meta.status, RunStatus::Completed);
    assert_eq!(meta.input_mode, "ask");
    assert_eq!(meta.input_ref, "user-prompt");
    assert!(meta.error.is_empty());
    let names: Vec<&str> = meta.steps.iter().map(|step| step.name.as_str()).collect();
    assert_eq!(names, vec!["Plan", "Review"]);
    assert!(meta.steps.iter().all(|step| step.status == StepStatus::Completed));

    assert!(
        fs::read_to_string(dir.join("TICKET.md"))
            .unwrap()
            .starts_with("# Add a login page\n\n")
    );
    assert_eq!(
        fs::read_to_string(dir.join("PLAN.md")).unwrap(),
        "## Summary\nAdd the page"
    );
    assert_eq!(fs::read_to_string(dir.join("REVIEW.md")).unwrap(), "Looks fine");
    assert_eq!(
        fs::read_to_string(root.join(".relay").join("PLAN.md")).unwrap(),
        "## Summary\nAdd the page"
    );

    let requests = scripted.api.requests();
    assert_eq!(requests.len(), 2);
    let defaults = RelayConfig::default();
    assert_eq!(requests[0].model, defaults.roles.planner);
    assert_eq!(requests[1].model, defaults.roles.reviewer);
    assert!(requests[0].system_prompt.contains("en"));
    assert_eq!(
        requests[1].inputs.get("PLAN.md").map(String::as_str),
        Some("## Summary\nAdd the page")
    );
    assert_eq!(requests[1].work_dir, root);

    let events = display.events();
    assert_eq!(events.first(), Some(&DisplayEvent::Header("Add a login page".to_string())));
    assert!(events.contains(&DisplayEvent::StepDone {
        name: "Plan".to_string(),
        detail: "PLAN.md".to_string(),
        cost: 0.0,
    }));
    assert_eq!(events.last(), Some(&DisplayEvent::Summary { total_cost: 0.0 }));
}

#[test]
fn step_costs_accumulate() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(root, "plan-review", PLAN_REVIEW);

    let scripted = ScriptedExecutors::new();
    scripted.api.push_output("plan", 0.25).push_output("review", 0.5);

    let outcome = run(
        root,
        "plan-review",
        &scripted.set(),
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .expect("session");

    assert!((outcome.total_cost - 0.75).abs() < 1e-9);
    let (_, meta) = latest_run(root);
    assert!((meta.total_cost - 0.75).abs() < 1e-9);
    assert_eq!(meta.steps[0].cost, 0.25);
}

#[test]
fn failing_step_stops_the_pipeline() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(root, "three", THREE_STEPS);

    let scripted = ScriptedExecutors::new();
    scripted
        .api
        .push_output("the plan", 0.1)
        .push_error("API returned 429: rate limited");
    let display = RecordingDisplay::new();

    let err = run(root, "three", &scripted.set(), &display, &CancelToken::new()).unwrap_err();
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::StepFailed { step, .. }) => assert_eq!(step, "Review"),
        other => panic!("expected step failure, got {other:?}"),
    }
    assert!(err.to_string().contains("rate limited"));
    assert_eq!(scripted.api.step_names(), vec!["Plan", "Review"]);

    let (dir, meta) = latest_run(root);
    assert_eq!(meta.status, RunStatus::Failed);
    assert!(meta.error.contains("rate limited"));
    assert_eq!(meta.steps.len(), 2);
    assert_eq!(meta.steps[0].status, StepStatus::Completed);
    assert_eq!(meta.steps[1].status, StepStatus::Failed);
    assert!(meta.steps[1].error.contains("429"));
    assert!((meta.total_cost - 0.1).abs() < 1e-9);
    assert!(!dir.join("REVIEW.md").exists());
    assert!(!root.join(".relay").join("PLAN.md").exists());

    let events = display.events();
    assert!(events.iter().any(|event| matches!(
        event,
        DisplayEvent::StepFailed { name, .. } if name == "Review"
    )));
    assert!(matches!(events.last(), Some(DisplayEvent::Failed(_))));
    assert!(!events.iter().any(|event| matches!(event, DisplayEvent::Summary { .. })));
}

#[test]
fn missing_input_fails_the_owning_step() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(
        root,
        "needs-file",
        r#"
name = "needs-file"

[[steps]]
name = "Review"
executor = "api"
model = "test/reviewer"
input = ["NOPE.md"]
output = "REVIEW.md"
"#,
    );

    let scripted = ScriptedExecutors::new();
    let err = run(
        root,
        "needs-file",
        &scripted.set(),
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("NOPE.md"));
    assert!(scripted.api.requests().is_empty());
    let (_, meta) = latest_run(root);
    assert_eq!(meta.status, RunStatus::Failed);
    assert_eq!(meta.steps.len(), 1);
}

#[test]
fn cancellation_between_steps_marks_run_failed() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(root, "three", THREE_STEPS);

    let scripted = ScriptedExecutors::new();
    let cancel = CancelToken::new();
    let display = RecordingDisplay::cancelling_after("Plan", cancel.clone());

    let err = run(root, "three", &scripted.set(), &display, &cancel).unwrap_err();
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Cancelled { next_step }) => assert_eq!(next_step, "Review"),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(scripted.api.step_names(), vec!["Plan"]);

    let (_, meta) = latest_run(root);
    assert_eq!(meta.status, RunStatus::Failed);
    assert_eq!(meta.error, "cancelled");
    assert_eq!(meta.steps.len(), 1);
    assert_eq!(
        display.events().last(),
        Some(&DisplayEvent::Failed("cancelled".to_string()))
    );
}

#[test]
fn step_without_executor_fails_at_dispatch() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(
        root,
        "bare",
        r#"
name = "bare"

[[steps]]
name = "Plan"
input = ["TICKET.md"]
output = "PLAN.md"
"#,
    );

    let scripted = ScriptedExecutors::new();
    let err = run(
        root,
        "bare",
        &scripted.set(),
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("has no executor"));
    assert!(scripted.api.requests().is_empty());
    assert!(scripted.agent.requests().is_empty());
    assert!(scripted.shell.requests().is_empty());
    let (_, meta) = latest_run(root);
    assert_eq!(meta.status, RunStatus::Failed);
}

#[test]
fn unknown_executor_is_rejected_before_any_run_exists() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(
        root,
        "typo",
        r#"
name = "typo"

[[steps]]
name = "Plan"
executor = "gpt"
"#,
    );

    let scripted = ScriptedExecutors::new();
    let err = run(
        root,
        "typo",
        &scripted.set(),
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(err.downcast_ref::<EngineError>().is_none());
    assert!(format!("{err:#}").contains("gpt"));
    assert!(!runs_dir(root).exists());
}

#[test]
fn unknown_pipeline_is_rejected_before_any_run_exists() {
    let project = temp_project();
    let root = project.path();
    let scripted = ScriptedExecutors::new();

    let err = run(
        root,
        "does-not-exist-anywhere",
        &scripted.set(),
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("does-not-exist-anywhere"));
    assert!(!runs_dir(root).exists());
}

#[test]
fn shell_step_runs_in_project_root() {
    let project = temp_project();
    let root = project.path();
    fs::write(root.join("marker.txt"), "from the project\n").unwrap();
    write_pipeline(
        root,
        "shell",
        r#"
name = "shell"

[[steps]]
name = "Inspect"
executor = "shell"
command = "cat marker.txt"
output = "INSPECT.md"
"#,
    );

    let scripted = ScriptedExecutors::new();
    let executors = ExecutorSet::new(
        Box::new(scripted.api.clone()),
        Box::new(scripted.agent.clone()),
        Box::new(ShellExecutor::new(&ShellExecutorConfig::default())),
    );

    let outcome = run(
        root,
        "shell",
        &executors,
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .expect("session");

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        fs::read_to_string(outcome.run_dir.join("INSPECT.md")).unwrap(),
        "from the project\n"
    );
}

#[test]
fn spec_file_input_is_recorded() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(root, "plan-review", PLAN_REVIEW);
    let spec = root.join("login.md");
    fs::write(&spec, "# Login page\n\nUsers need to sign in.\n").unwrap();

    let scripted = ScriptedExecutors::new();
    let outcome = run_session(
        &SessionRequest {
            root: root.to_path_buf(),
            source: InputSource::SpecFile(spec.clone()),
            pipeline: Some("plan-review".to_string()),
        },
        &RelayConfig::default(),
        &scripted.set(),
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .expect("session");

    assert!(outcome.run_id.ends_with("-login-page"));
    let (_, meta) = latest_run(root);
    assert_eq!(meta.input_mode, "do");
    assert_eq!(meta.input_ref, spec.display().to_string());
    let ticket = &scripted.api.requests()[0].inputs["TICKET.md"];
    assert!(ticket.contains("Users need to sign in."));
}

const BUDGETED: &str = r#"
name = "budgeted"

[[steps]]
name = "Plan"
executor = "api"
model = "test/planner"
input = ["BIG.md"]
output = "PLAN.md"

[[steps]]
name = "Code"
executor = "claude-code"
input = ["BIG.md"]
output = "CODE.md"

[[steps]]
name = "Check"
executor = "shell"
command = "true"
input = ["BIG.md"]
output = "CHECK.md"
"#;

fn run_with(
    root: &Path,
    pipeline: &str,
    cfg: &RelayConfig,
    scripted: &ScriptedExecutors,
) -> SessionOutcome {
    run_session(
        &request(root, pipeline),
        cfg,
        &scripted.set(),
        &RecordingDisplay::new(),
        &CancelToken::new(),
    )
    .expect("session")
}

#[test]
fn api_inputs_are_cut_to_the_token_budget() {
    let project = temp_project();
    let root = project.path();
    write_pipeline(root, "budgeted", BUDGETED);
    let big = "x".repeat(4_000);
    fs::write(root.join("BIG.md"), &big).unwrap();

    let cfg = RelayConfig {
        max_context_tokens: 100,
        ..RelayConfig::default()
    };
    let scripted = ScriptedExecutors::new();
    run_with(root, "budgeted", &cfg, &scripted);

    let api = scripted.api.requests();
    let sent = &api[0].inputs["BIG.md"];
    assert!(sent.ends_with(TRUNCATION_MARKER));
    assert_eq!(sent.len(), 100 * CHARS_PER_TOKEN + TRUNCATION_MARKER.len());

    assert_eq!(scripted.agent.requests()[0].inputs["BIG.md"], big);
    assert_eq!(scripted.shell.requests()[0].inputs["BIG.md"], big);
}

#[test]
fn non_positive_token_budget_leaves_api_inputs_whole() {
    let big = "y".repeat(4_000);
    for max_context_tokens in [0, -1] {
        let project = temp_project();
        let root = project.path();
        write_pipeline(root, "budgeted", BUDGETED);
        fs::write(root.join("BIG.md"), &big).unwrap();

        let cfg = RelayConfig {
            max_context_tokens,
            ..RelayConfig::default()
        };
        let scripted = ScriptedExecutors::new();
        run_with(root, "budgeted", &cfg, &scripted);
        assert_eq!(scripted.api.requests()[0].inputs["BIG.md"], big);
    }
}

#[test]
fn revise_step_sees_only_files_named_by_the_plan() {
    let project = temp_project();
    let root = project.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/foo.rs"), "pub fn foo() {}\n").unwrap();
    fs::write(root.join("src/bar.rs"), "pub fn bar() {}\n").unwrap();
    write_pipeline(
        root,
        "narrow",
        r#"
name = "narrow"

[[steps]]
name = "Plan"
executor = "api"
model = "test/planner"
input = ["TICKET.md", "project:context"]
output = "PLAN.md"

[[steps]]
name = "Revise"
executor = "api"
model = "test/editor"
input = ["PLAN.md", "project:context"]
output = "PLAN.md"
"#,
    );

    let scripted = ScriptedExecutors::new();
    scripted
        .api
        .push_output("## Files to Change\n- src/foo.rs\n\n## Steps\n- do it\n", 0.0);
    run_with(root, "narrow", &RelayConfig::default(), &scripted);

    let requests = scripted.api.requests();
    assert_eq!(scripted.api.step_names(), vec!["Plan", "Revise"]);
    let planned = &requests[0].inputs["project:context"];
    assert!(planned.contains("### src/foo.rs"));
    assert!(planned.contains("### src/bar.rs"));

    let revised = &requests[1].inputs["project:context"];
    assert!(revised.starts_with("## Project Context\n\n"));
    assert!(revised.contains("### src/foo.rs"));
    assert!(!revised.contains("src/bar.rs"));
}
