//! Relay configuration (`.relay/config.toml`).
//!
//! Configuration is layered: built-in defaults, then the user file
//! (`~/.relay/config.toml`), then the project file. Layers are merged as TOML
//! tables before deserialising, so a project file can override a single key
//! without resetting its siblings.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::roles::RolesConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Pipeline used when none is given on the command line.
    pub default_pipeline: String,
    /// Approximate token ceiling for API step inputs. `<= 0` disables budgeting.
    pub max_context_tokens: i64,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub provider: ProviderConfig,
    pub roles: RolesConfig,
    pub executors: ExecutorsConfig,
    pub language: LanguageConfig,
    pub project_context: ProjectContextConfig,
}

/// OpenAI-compatible chat completion provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorsConfig {
    pub agent: AgentExecutorConfig,
    pub shell: ShellExecutorConfig,
}

/// Delegated coding-agent CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentExecutorConfig {
    pub command: String,
    pub timeout_secs: u64,
    /// Bytes of agent stdout/stderr kept in memory.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellExecutorConfig {
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LanguageConfig {
    /// Language artifacts are written in; exposed to prompt templates.
    pub artifacts: String,
}

/// Project scanning limits for the `project:context` input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectContextConfig {
    pub max_files: usize,
    pub max_file_size_bytes: u64,
    /// Basename wildcards, e.g. `*.rs`.
    pub include_patterns: Vec<String>,
    /// Path prefixes or fragments, e.g. `target/`.
    pub exclude_patterns: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_pipeline: "default".to_string(),
            max_context_tokens: 80_000,
            log_level: "warn".to_string(),
            provider: ProviderConfig::default(),
            roles: RolesConfig::default(),
            executors: ExecutorsConfig::default(),
            language: LanguageConfig::default(),
            project_context: ProjectContextConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for AgentExecutorConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for ShellExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            artifacts: "en".to_string(),
        }
    }
}

impl Default for ProjectContextConfig {
    fn default() -> Self {
        Self {
            max_files: 20,
            max_file_size_bytes: 50 * 1024,
            include_patterns: ["*.rs", "*.go", "*.ts", "*.py", "*.md", "*.toml"]
                .map(String::from)
                .to_vec(),
            exclude_patterns: ["target/", "vendor/", "node_modules/", ".git/", ".relay/"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_pipeline.trim().is_empty() {
            return Err(anyhow!("default_pipeline must be non-empty"));
        }
        if self.provider.endpoint.trim().is_empty() {
            return Err(anyhow!("provider.endpoint must be non-empty"));
        }
        if self.provider.timeout_secs == 0 {
            return Err(anyhow!("provider.timeout_secs must be > 0"));
        }
        if self.executors.agent.command.trim().is_empty() {
            return Err(anyhow!("executors.agent.command must be non-empty"));
        }
        if self.executors.agent.timeout_secs == 0 || self.executors.shell.timeout_secs == 0 {
            return Err(anyhow!("executor timeout_secs must be > 0"));
        }
        if self.executors.agent.output_limit_bytes == 0
            || self.executors.shell.output_limit_bytes == 0
        {
            return Err(anyhow!("executor output_limit_bytes must be > 0"));
        }
        for pattern in &self.project_context.include_patterns {
            glob::Pattern::new(pattern)
                .with_context(|| format!("project_context.include_patterns: {pattern:?}"))?;
        }
        Ok(())
    }
}

/// Locations of the configuration layers.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub user: Option<PathBuf>,
    pub project: PathBuf,
}

impl ConfigPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            user: user_relay_dir().map(|dir| dir.join("config.toml")),
            project: root.join(".relay").join("config.toml"),
        }
    }
}

/// `~/.relay`, when a home directory is known.
pub fn user_relay_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".relay"))
}

/// Load and validate the layered configuration for a project root.
pub fn load_config(root: &Path) -> Result<RelayConfig> {
    load_layers(&ConfigPaths::new(root))
}

/// Merge defaults with every existing layer in `paths`, lowest priority first.
pub fn load_layers(paths: &ConfigPaths) -> Result<RelayConfig> {
    let defaults = toml::to_string(&RelayConfig::default()).context("serialize default config")?;
    let mut merged: toml::Table = toml::from_str(&defaults).context("parse default config")?;

    for path in paths.user.iter().chain(std::iter::once(&paths.project)) {
        if !path.exists() {
            continue;
        }
        debug!(path = %path.display(), "merging config layer");
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let layer: toml::Table =
            toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        merge_tables(&mut merged, layer);
    }

    let cfg: RelayConfig = toml::Value::Table(merged)
        .try_into()
        .context("deserialize merged config")?;
    cfg.validate()?;
    Ok(cfg)
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RelayConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
