//! Project scanning for the `project:context` input.

use std::fs;
use std::path::Path;

use glob::Pattern;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::io::config::ProjectContextConfig;

/// One collected project file, keyed by its `/`-separated relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
}

/// Aggregated project files in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectContext {
    pub files: Vec<ProjectFile>,
}

impl ProjectContext {
    /// Walk `root` collecting files that pass the configured filters.
    ///
    /// Unreadable entries are skipped; scanning never fails the run.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn scan(root: &Path, cfg: &ProjectContextConfig) -> Self {
        let mut files = Vec::new();
        if cfg.max_files == 0 {
            return Self { files };
        }
        let includes = compile_patterns(&cfg.include_patterns);

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| keep_dir(entry, root, cfg));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(err = %err, "skipping unreadable path");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative_path(entry.path(), root);
            if cfg
                .exclude_patterns
                .iter()
                .any(|pattern| rel.contains(pattern.as_str()))
            {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !includes.iter().any(|pattern| pattern.matches(&name)) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.len() > cfg.max_file_size_bytes => continue,
                Ok(_) => {}
                Err(_) => continue,
            }
            let content = match fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %rel, err = %err, "skipping unreadable project file");
                    continue;
                }
            };
            files.push(ProjectFile { path: rel, content });
            if files.len() >= cfg.max_files {
                break;
            }
        }
        debug!(count = files.len(), "project scan complete");
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Markdown rendering used as the `project:context` input.
    pub fn render(&self) -> String {
        if self.files.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Project Context\n\n");
        for file in &self.files {
            out.push_str(&format!("### {}\n\n```\n{}\n```\n\n", file.path, file.content));
        }
        out
    }

    /// Keep only files referenced by `paths` (suffix match on normalised paths).
    pub fn filter_to(&self, paths: &[String]) -> Self {
        let wanted: Vec<String> = paths.iter().map(|p| normalize(p)).collect();
        let files = self
            .files
            .iter()
            .filter(|file| {
                let have = normalize(&file.path);
                wanted
                    .iter()
                    .any(|want| have == *want || have.ends_with(&format!("/{want}")))
            })
            .cloned()
            .collect();
        Self { files }
    }
}

fn keep_dir(entry: &DirEntry, root: &Path, cfg: &ProjectContextConfig) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    if entry.file_name().to_string_lossy().starts_with('.') {
        return false;
    }
    let dir = format!("{}/", relative_path(entry.path(), root));
    !cfg.exclude_patterns.iter().any(|pattern| {
        dir.starts_with(pattern.as_str()) || dir.contains(&format!("/{pattern}"))
    })
}

fn relative_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize(path: &str) -> String {
    path.trim()
        .trim_start_matches("./")
        .trim_start_matches('/')
        .replace('\\', "/")
}

/// Compile basename patterns, skipping invalid ones with a warning.
fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!(pattern = %raw, err = %err, "ignoring invalid include pattern");
                None
            }
        })
        .collect()
}
