//! Read-only cost and outcome reporting over `.relay/runs/`.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::RunStatus;
use crate::io::run_store::{LATEST_POINTER, META_FILE, Meta, load_meta};

/// One run as seen by `relay stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    pub meta: Meta,
}

/// Totals over a set of runs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTotals {
    pub runs: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_cost: f64,
}

impl RunTotals {
    pub fn average_cost(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.total_cost / self.runs as f64
        }
    }
}

/// Every readable run under `runs_dir`, newest first.
///
/// A missing directory yields no runs. Entries without a parseable
/// `meta.json` are skipped.
pub fn collect_runs(runs_dir: &Path) -> Result<Vec<RunRecord>> {
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }
    let entries =
        fs::read_dir(runs_dir).with_context(|| format!("read {}", runs_dir.display()))?;

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", runs_dir.display()))?;
        let id = entry.file_name().to_string_lossy().into_owned();
        if id == LATEST_POINTER || !entry.path().is_dir() {
            continue;
        }
        match load_meta(&entry.path().join(META_FILE)) {
            Ok(meta) => runs.push(RunRecord { id, meta }),
            Err(err) => debug!(run_id = %id, err = %err, "skipping run without readable meta"),
        }
    }
    runs.sort_by(|a, b| {
        b.meta
            .started_at
            .cmp(&a.meta.started_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    Ok(runs)
}

pub fn totals(runs: &[RunRecord]) -> RunTotals {
    runs.iter().fold(RunTotals::default(), |mut acc, run| {
        acc.runs += 1;
        acc.total_cost += run.meta.total_cost;
        match run.meta.status {
            RunStatus::Completed => acc.completed += 1,
            RunStatus::Failed => acc.failed += 1,
            RunStatus::Running => {}
        }
        acc
    })
}

/// Render the totals block and per-run table.
pub fn render_stats(runs: &[RunRecord]) -> String {
    if runs.is_empty() {
        return "No runs found.\n".to_string();
    }
    let totals = totals(runs);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Runs: {} total, {} completed, {} failed",
        totals.runs, totals.completed, totals.failed
    );
    let _ = writeln!(out, "Total cost: ${:.4}", totals.total_cost);
    let _ = writeln!(out, "Average cost: ${:.4}", totals.average_cost());
    out.push('\n');
    let _ = writeln!(out, "{:<40} {:<10} {:<12} Mode", "Run ID", "Status", "Cost");
    for run in runs {
        let _ = writeln!(
            out,
            "{:<40} {:<10} ${:<11.4} {}",
            run.id,
            run.meta.status.as_str(),
            run.meta.total_cost,
            run.meta.input_mode
        );
    }
    out
}
