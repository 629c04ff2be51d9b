//! Pipeline input sources.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::slug::{DEFAULT_SLUG, sanitize_slug};

/// Longest prompt prefix used as a title.
const PROMPT_TITLE_CHARS: usize = 50;

/// How a run was started; recorded as `input_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Do,
    Ask,
}

impl InputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Do => "do",
            Self::Ask => "ask",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised pipeline input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInput {
    pub title: String,
    pub body: String,
    pub slug: String,
    pub mode: InputMode,
    /// Spec path or `user-prompt`; recorded as `input_ref`.
    pub reference: String,
}

impl RunInput {
    /// Contents of the run's `TICKET.md`.
    pub fn ticket(&self) -> String {
        format!("# {}\n\n{}\n", self.title, self.body)
    }
}

/// Where the run's ticket comes from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// A local Markdown spec file.
    SpecFile(PathBuf),
    /// A free-form request typed on the command line.
    Prompt(String),
}

impl InputSource {
    pub fn fetch(&self) -> Result<RunInput> {
        match self {
            Self::SpecFile(path) => {
                let body = fs::read_to_string(path)
                    .with_context(|| format!("read spec file {}", path.display()))?;
                let title = spec_title(&body);
                let mut slug = sanitize_slug(&title);
                if slug == DEFAULT_SLUG
                    && let Some(stem) = path.file_stem()
                {
                    slug = sanitize_slug(&stem.to_string_lossy());
                }
                Ok(RunInput {
                    title,
                    body,
                    slug,
                    mode: InputMode::Do,
                    reference: path.display().to_string(),
                })
            }
            Self::Prompt(text) => {
                let title = if text.chars().count() > PROMPT_TITLE_CHARS {
                    let head: String = text.chars().take(PROMPT_TITLE_CHARS).collect();
                    format!("{head}...")
                } else {
                    text.clone()
                };
                Ok(RunInput {
                    title,
                    body: text.clone(),
                    slug: sanitize_slug(text),
                    mode: InputMode::Ask,
                    reference: "user-prompt".to_string(),
                })
            }
        }
    }
}

/// First non-empty line with leading `#` removed; `spec` when there is none.
fn spec_title(content: &str) -> String {
    content
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .unwrap_or("spec")
        .to_string()
}
