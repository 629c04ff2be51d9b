//! `relay init`: scaffold `.relay/` in a project root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::io::config::{RelayConfig, write_config};
use crate::session::relay_dir;

const RELAY_GITIGNORE: &str = "runs/\n";

/// Files created by [`init_project`].
#[derive(Debug, Clone)]
pub struct InitPaths {
    pub relay_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl InitPaths {
    pub fn new(root: &Path) -> Self {
        let relay_dir = relay_dir(root);
        Self {
            config_path: relay_dir.join("config.toml"),
            gitignore_path: relay_dir.join(".gitignore"),
            relay_dir,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Overwrite an existing config.
    pub force: bool,
}

/// Write the default config and a `.gitignore` for run records.
///
/// Fails if `.relay/config.toml` already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: InitOptions) -> Result<InitPaths> {
    let paths = InitPaths::new(root);
    if paths.relay_dir.exists() && !paths.relay_dir.is_dir() {
        return Err(anyhow!(
            "relay init: {} exists but is not a directory",
            paths.relay_dir.display()
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "relay init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    write_config(&paths.config_path, &RelayConfig::default())?;
    if options.force || !paths.gitignore_path.exists() {
        fs::write(&paths.gitignore_path, RELAY_GITIGNORE)
            .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    }
    info!(path = %paths.config_path.display(), "initialized relay config");
    Ok(paths)
}
