//! Step input resolution.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use crate::core::plan::{extract_files_from_plan, plan_headings};
use crate::core::types::{GIT_DIFF_INPUT, InputFiles, PROJECT_CONTEXT_INPUT, Step};
use crate::io::project::ProjectContext;

/// Step name whose project context is narrowed to the plan's files.
pub const REVISION_STEP: &str = "revise";
/// Artifact the revision filter reads file paths from.
pub const PLAN_ARTIFACT: &str = "PLAN.md";

/// Maps step input names to text using precomputed collaborator output.
#[derive(Debug, Clone)]
pub struct ContextResolver {
    run_dir: PathBuf,
    work_dir: PathBuf,
    git_diff: String,
    project: ProjectContext,
    project_text: String,
}

impl ContextResolver {
    pub fn new(
        run_dir: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        git_diff: String,
        project: ProjectContext,
    ) -> Self {
        let project_text = project.render();
        Self {
            run_dir: run_dir.into(),
            work_dir: work_dir.into(),
            git_diff,
            project,
            project_text,
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Resolve every declared input; a missing file fails the whole call.
    pub fn resolve_input(&self, names: &[String]) -> Result<InputFiles> {
        let mut files = InputFiles::new();
        for name in names {
            let content = match name.as_str() {
                GIT_DIFF_INPUT => self.git_diff.clone(),
                PROJECT_CONTEXT_INPUT => self.project_text.clone(),
                _ => self.read_file(name)?,
            };
            files.insert(name.clone(), content);
        }
        Ok(files)
    }

    /// Resolve a step's inputs, narrowing the project context for the
    /// revision step when a plan lists the files it touches.
    #[instrument(skip_all, fields(step = %step.name))]
    pub fn resolve_step(&self, step: &Step) -> Result<InputFiles> {
        let mut files = self.resolve_input(&step.input)?;
        if !step.name.trim().eq_ignore_ascii_case(REVISION_STEP)
            || !files.contains_key(PROJECT_CONTEXT_INPUT)
        {
            return Ok(files);
        }
        let Some(plan) = files.get(PLAN_ARTIFACT) else {
            return Ok(files);
        };

        let paths = extract_files_from_plan(plan);
        if paths.is_empty() {
            debug!(headings = ?plan_headings(plan), "plan lists no files; keeping full project context");
            return Ok(files);
        }
        let filtered = self.project.filter_to(&paths);
        if filtered.is_empty() {
            debug!(?paths, "no scanned file matches the plan; keeping full project context");
            return Ok(files);
        }
        debug!(
            kept = filtered.files.len(),
            scanned = self.project.files.len(),
            "narrowed project context to plan files"
        );
        files.insert(PROJECT_CONTEXT_INPUT.to_string(), filtered.render());
        Ok(files)
    }

    fn read_file(&self, name: &str) -> Result<String> {
        for base in [&self.run_dir, &self.work_dir] {
            if let Ok(content) = fs::read_to_string(base.join(name)) {
                return Ok(content);
            }
        }
        Err(anyhow!(
            "input {name:?}: file not found in run dir or working dir"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::project::ProjectFile;

    fn project() -> ProjectContext {
        ProjectContext {
            files: vec![
                ProjectFile {
                    path: "internal/foo.go".to_string(),
                    content: "package foo".to_string(),
                },
                ProjectFile {
                    path: "internal/bar.go".to_string(),
                    content: "package bar".to_string(),
                },
            ],
        }
    }

    fn step(name: &str, input: &[&str]) -> Step {
        Step {
            name: name.to_string(),
            executor: "api".to_string(),
            input: input.iter().map(|s| s.to_string()).collect(),
            ..Step::default()
        }
    }

    struct Dirs {
        _temp: tempfile::TempDir,
        run: PathBuf,
        work: PathBuf,
    }

    fn dirs() -> Dirs {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = temp.path().join("run");
        let work = temp.path().join("work");
        fs::create_dir_all(&run).unwrap();
        fs::create_dir_all(&work).unwrap();
        Dirs {
            _temp: temp,
            run,
            work,
        }
    }

    #[test]
    fn resolves_virtual_inputs_and_files_with_run_dir_priority() {
        let d = dirs();
        fs::write(d.run.join("PLAN.md"), "from run").unwrap();
        fs::write(d.work.join("PLAN.md"), "from work").unwrap();
        fs::write(d.work.join("README.md"), "readme").unwrap();
        let resolver = ContextResolver::new(&d.run, &d.work, "diff --git a b".to_string(), project());

        let names: Vec<String> = ["git:diff", "project:context", "PLAN.md", "README.md"]
            .map(String::from)
            .to_vec();
        let files = resolver.resolve_input(&names).expect("resolve");
        assert_eq!(files["git:diff"], "diff --git a b");
        assert!(files["project:context"].contains("### internal/bar.go"));
        assert_eq!(files["PLAN.md"], "from run");
        assert_eq!(files["README.md"], "readme");
    }

    #[test]
    fn missing_file_fails() {
        let d = dirs();
        let resolver = ContextResolver::new(&d.run, &d.work, String::new(), project());
        let err = resolver
            .resolve_input(&["NOPE.md".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("not found in run dir or working dir"));
    }

    #[test]
    fn revision_step_narrows_project_context() {
        let d = dirs();
        fs::write(d.run.join("PLAN.md"), "## Files to Change\n- internal/foo.go\n").unwrap();
        let resolver = ContextResolver::new(&d.run, &d.work, String::new(), project());

        let files = resolver
            .resolve_step(&step("Revise", &["PLAN.md", "project:context"]))
            .expect("resolve");
        assert!(files["project:context"].contains("internal/foo.go"));
        assert!(!files["project:context"].contains("internal/bar.go"));

        let review = resolver
            .resolve_step(&step("Review", &["PLAN.md", "project:context"]))
            .expect("resolve");
        assert!(review["project:context"].contains("internal/bar.go"));
    }

    #[test]
    fn revision_step_keeps_full_context_when_plan_lists_nothing_usable() {
        let d = dirs();
        fs::write(d.run.join("PLAN.md"), "## Steps\n- do it\n").unwrap();
        let resolver = ContextResolver::new(&d.run, &d.work, String::new(), project());
        let files = resolver
            .resolve_step(&step("revise", &["PLAN.md", "project:context"]))
            .expect("resolve");
        assert!(files["project:context"].contains("internal/bar.go"));

        fs::write(d.run.join("PLAN.md"), "## Files to Change\n- other/file.rs\n").unwrap();
        let files = resolver
            .resolve_step(&step("revise", &["PLAN.md", "project:context"]))
            .expect("resolve");
        assert!(files["project:context"].contains("internal/bar.go"));
    }
}
