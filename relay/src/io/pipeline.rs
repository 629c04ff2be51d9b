//! Pipeline definition loading.
//!
//! Lookup order for `<name>`: `.relay/pipelines/<name>.toml`, then
//! `~/.relay/pipelines/<name>.toml`, then the embedded pipelines.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::core::types::Pipeline;
use crate::io::config::user_relay_dir;

const EMBEDDED: [(&str, &str); 2] = [
    ("default", include_str!("pipelines/default.toml")),
    ("implement", include_str!("pipelines/implement.toml")),
];

/// Parse a pipeline document. The pipeline must be named.
pub fn parse_pipeline(contents: &str) -> Result<Pipeline> {
    let pipeline: Pipeline = toml::from_str(contents).context("parse pipeline toml")?;
    if pipeline.name.trim().is_empty() {
        return Err(anyhow!("pipeline must have a name"));
    }
    Ok(pipeline)
}

/// Names of the embedded pipelines.
pub fn embedded_pipeline_names() -> impl Iterator<Item = &'static str> {
    EMBEDDED.iter().map(|(name, _)| *name)
}

/// Override directories for `root`, highest priority first.
pub fn pipeline_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![root.join(".relay").join("pipelines")];
    dirs.extend(user_relay_dir().map(|dir| dir.join("pipelines")));
    dirs
}

/// Load pipeline `name` from `dirs` or the embedded set.
pub fn load_pipeline(dirs: &[PathBuf], name: &str) -> Result<Pipeline> {
    for dir in dirs {
        let path = dir.join(format!("{name}.toml"));
        if path.is_file() {
            debug!(path = %path.display(), "loading pipeline override");
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read pipeline {}", path.display()))?;
            return parse_pipeline(&contents).with_context(|| format!("load {}", path.display()));
        }
    }
    let (_, contents) = EMBEDDED
        .iter()
        .find(|(embedded, _)| *embedded == name)
        .ok_or_else(|| anyhow!("pipeline {name:?} not found"))?;
    parse_pipeline(contents).with_context(|| format!("load embedded pipeline {name:?}"))
}
