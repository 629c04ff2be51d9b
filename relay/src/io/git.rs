//! Git adapter for run metadata and the `git:diff` input.
//!
//! Relay only reads repository state, so the wrapper is a handful of
//! explicit `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Branch and commit recorded on a run. Empty when unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSnapshot {
    pub branch: String,
    pub commit: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Current branch name; `HEAD` when detached.
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    pub fn head_short_sha(&self, len: usize) -> Result<String> {
        let arg = format!("--short={len}");
        let out = self.run_capture(&["rev-parse", &arg, "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Combined staged and unstaged changes against `HEAD`.
    #[instrument(skip_all)]
    pub fn diff(&self) -> Result<String> {
        let out = self.run_capture(&["diff", "HEAD"])?;
        debug!(bytes = out.len(), "captured git diff");
        Ok(out)
    }

    /// Branch and short commit, degrading to empty values with a warning.
    pub fn snapshot(&self) -> GitSnapshot {
        let branch = self.current_branch().unwrap_or_else(|err| {
            warn!(err = %err, "could not read git branch");
            String::new()
        });
        let commit = self.head_short_sha(8).unwrap_or_else(|err| {
            warn!(err = %err, "could not read git commit");
            String::new()
        });
        GitSnapshot { branch, commit }
    }

    /// Diff text for the `git:diff` input; empty outside a repository.
    pub fn diff_or_empty(&self) -> String {
        self.diff().unwrap_or_else(|err| {
            warn!(err = %err, "could not read git diff");
            String::new()
        })
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
