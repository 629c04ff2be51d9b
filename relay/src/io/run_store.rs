//! Durable record of one pipeline invocation (`.relay/runs/<id>/`).
//!
//! `meta.json` is rewritten in full on every mutation so readers doing
//! whole-file reads never see a partial step log. The `latest` pointer is a
//! small text file holding the newest run id, replaced via temp file + rename.
//!
//! External stats tooling compares `meta.json` byte for byte, so the encoding
//! is pinned: integral costs carry no fraction, a run with no steps records
//! `"steps": null`, timestamps are RFC 3339 with trailing zero nanoseconds
//! trimmed and `Z` for UTC, `<`, `>` and `&` are `\u`-escaped, and there is no
//! trailing newline.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local, Offset, TimeZone, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, instrument};

use crate::core::slug::sanitize_slug;
use crate::core::types::{RunStatus, StepStatus};
use crate::io::git::GitSnapshot;

pub const META_FILE: &str = "meta.json";
pub const LATEST_POINTER: &str = "latest";

/// Persisted run metadata (`meta.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(serialize_with = "rfc3339_trimmed")]
    pub started_at: DateTime<Local>,
    pub input_mode: String,
    pub input_ref: String,
    pub status: RunStatus,
    #[serde(
        default,
        serialize_with = "empty_as_null",
        deserialize_with = "null_as_empty"
    )]
    pub steps: Vec<StepResult>,
    #[serde(default, serialize_with = "compact_float")]
    pub total_cost: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub git_branch: String,
    #[serde(default)]
    pub git_commit: String,
}

/// Outcome of one step, appended to [`Meta::steps`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, serialize_with = "compact_float")]
    pub cost: f64,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<StepResult>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<StepResult>>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_null<S: Serializer>(
    steps: &[StepResult],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if steps.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.collect_seq(steps)
    }
}

/// `0` rather than `0.0`; non-integral values keep the shortest round-trip form.
fn compact_float<S: Serializer>(
    value: &f64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    const EXACT_INT_LIMIT: f64 = 9_007_199_254_740_992.0;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < EXACT_INT_LIMIT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

fn rfc3339_trimmed<S: Serializer, Tz: TimeZone>(
    at: &DateTime<Tz>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(at))
}

/// RFC 3339 with only the significant nanosecond digits and `Z` for UTC.
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    let mut out = at.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = at.nanosecond() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    let offset = at.offset().fix();
    if offset.local_minus_utc() == 0 {
        out.push('Z');
    } else {
        out.push_str(&offset.to_string());
    }
    out
}

/// Escape the characters that must not appear raw in `meta.json` strings.
fn escape_markup(json: String) -> String {
    if !json.contains(['<', '>', '&', '\u{2028}', '\u{2029}']) {
        return json;
    }
    let mut out = String::with_capacity(json.len() + 16);
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}

/// Parameters for [`Run::create`].
#[derive(Debug, Clone)]
pub struct NewRun {
    pub mode: String,
    pub reference: String,
    pub slug: String,
    pub git: GitSnapshot,
}

/// A live run. The engine is its only writer.
#[derive(Debug)]
pub struct Run {
    id: String,
    dir: PathBuf,
    meta: Meta,
}

/// `YYYYMMDD-HHMMSS-mmm-slug`; sorts lexicographically in start order.
pub fn run_id(started_at: &DateTime<Local>, slug: &str) -> String {
    format!(
        "{}-{:03}-{}",
        started_at.format("%Y%m%d-%H%M%S"),
        started_at.timestamp_subsec_millis() % 1000,
        sanitize_slug(slug)
    )
}

impl Run {
    /// Provision a run directory under `runs_dir`, persist the initial
    /// metadata, and point `latest` at it.
    pub fn create(runs_dir: &Path, new: NewRun) -> Result<Self> {
        Self::create_at(runs_dir, new, Local::now())
    }

    #[instrument(skip_all, fields(runs_dir = %runs_dir.display()))]
    pub fn create_at(runs_dir: &Path, new: NewRun, started_at: DateTime<Local>) -> Result<Self> {
        let id = run_id(&started_at, &new.slug);
        fs::create_dir_all(runs_dir)
            .with_context(|| format!("create runs dir {}", runs_dir.display()))?;
        let dir = runs_dir.join(&id);
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(anyhow!("run directory {} already exists", dir.display()));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("create run dir {}", dir.display()));
            }
        }

        let run = Self {
            id,
            dir,
            meta: Meta {
                started_at,
                input_mode: new.mode,
                input_ref: new.reference,
                status: RunStatus::Running,
                steps: Vec::new(),
                total_cost: 0.0,
                error: String::new(),
                git_branch: new.git.branch,
                git_commit: new.git.commit,
            },
        };
        run.save_meta()?;
        write_latest(runs_dir, &run.id)?;
        info!(run_id = %run.id, "created run");
        Ok(run)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Append a step result, add its cost, and re-persist.
    pub fn add_step_result(&mut self, result: StepResult) -> Result<()> {
        debug!(step = %result.name, status = ?result.status, cost = result.cost, "recording step result");
        self.meta.total_cost += result.cost;
        self.meta.steps.push(result);
        self.save_meta()
    }

    pub fn complete(&mut self) -> Result<()> {
        self.finish(RunStatus::Completed, String::new())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.finish(RunStatus::Failed, message.into())
    }

    fn finish(&mut self, status: RunStatus, error: String) -> Result<()> {
        if self.meta.status.is_terminal() {
            return Err(anyhow!(
                "run {} is already {:?}; refusing transition to {status:?}",
                self.id,
                self.meta.status
            ));
        }
        self.meta.status = status;
        self.meta.error = error;
        self.save_meta()
    }

    /// Path of `name` inside the run directory. Rejects escaping names.
    pub fn file_path(&self, name: &str) -> Result<PathBuf> {
        let rel = Path::new(name);
        let scoped = !name.is_empty()
            && rel
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !scoped {
            return Err(anyhow!("file name {name:?} escapes the run directory"));
        }
        Ok(self.dir.join(rel))
    }

    pub fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.file_path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        let path = self.file_path(name)?;
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    fn save_meta(&self) -> Result<()> {
        let path = self.dir.join(META_FILE);
        let buf = serde_json::to_string_pretty(&self.meta).context("serialize run meta")?;
        fs::write(&path, escape_markup(buf)).with_context(|| format!("write run meta {}", path.display()))
    }
}

/// Load a persisted `meta.json`.
pub fn load_meta(path: &Path) -> Result<Meta> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run meta {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse run meta {}", path.display()))
}

/// Id of the most recently created run, if any.
pub fn read_latest(runs_dir: &Path) -> Result<Option<String>> {
    let path = runs_dir.join(LATEST_POINTER);
    match fs::read_to_string(&path) {
        Ok(id) => Ok(Some(id.trim().to_string()).filter(|id| !id.is_empty())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

pub fn write_latest(runs_dir: &Path, id: &str) -> Result<()> {
    let path = runs_dir.join(LATEST_POINTER);
    let tmp_path = runs_dir.join(format!("{LATEST_POINTER}.tmp"));
    fs::write(&tmp_path, format!("{id}\n"))
        .with_context(|| format!("write temp pointer {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("replace pointer {}", path.display()))?;
    Ok(())
}
