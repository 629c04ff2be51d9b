//! System prompt assets.
//!
//! Lookup order for `<name>`: `.relay/prompts/<name>.md`, then
//! `~/.relay/prompts/<name>.md`, then the embedded defaults. Every prompt is
//! rendered through minijinja with the artifact `language` in scope.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::debug;

use crate::io::config::user_relay_dir;

const EMBEDDED: [(&str, &str); 4] = [
    ("plan", include_str!("prompts/plan.md")),
    ("review", include_str!("prompts/review.md")),
    ("revise", include_str!("prompts/revise.md")),
    ("implement", include_str!("prompts/implement.md")),
];

/// Resolves and renders named system prompts.
pub struct PromptLibrary {
    dirs: Vec<PathBuf>,
    language: String,
    env: Environment<'static>,
}

impl PromptLibrary {
    /// Project and user override directories for `root`.
    pub fn new(root: &Path, language: &str) -> Self {
        let mut dirs = vec![root.join(".relay").join("prompts")];
        dirs.extend(user_relay_dir().map(|dir| dir.join("prompts")));
        Self::with_dirs(dirs, language)
    }

    /// Explicit override directories, highest priority first.
    pub fn with_dirs(dirs: Vec<PathBuf>, language: &str) -> Self {
        Self {
            dirs,
            language: language.to_string(),
            env: Environment::new(),
        }
    }

    /// Embedded prompt names.
    pub fn embedded_names() -> impl Iterator<Item = &'static str> {
        EMBEDDED.iter().map(|(name, _)| *name)
    }

    /// Raw template text for `name`.
    pub fn source(&self, name: &str) -> Result<Cow<'static, str>> {
        for dir in &self.dirs {
            let path = dir.join(format!("{name}.md"));
            if path.is_file() {
                debug!(path = %path.display(), "using prompt override");
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("read prompt {}", path.display()))?;
                return Ok(Cow::Owned(text));
            }
        }
        EMBEDDED
            .iter()
            .find(|(embedded, _)| *embedded == name)
            .map(|(_, text)| Cow::Borrowed(*text))
            .ok_or_else(|| anyhow!("prompt template {name:?} not found"))
    }

    /// Rendered system prompt for `name`.
    pub fn render(&self, name: &str) -> Result<String> {
        let source = self.source(name)?;
        self.env
            .render_str(&source, context! { language => self.language.as_str() })
            .with_context(|| format!("render prompt {name:?}"))
    }
}
