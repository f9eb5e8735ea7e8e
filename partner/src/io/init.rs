//! Canonical project paths and `.partner/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{SessionConfig, write_config};

/// Fixed name of the durable context file inside the project directory.
pub const CONTEXT_FILE_NAME: &str = "project_context.json";

/// All canonical paths for a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub partner_dir: PathBuf,
    pub config_path: PathBuf,
    pub context_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let partner_dir = root.join(".partner");
        Self {
            config_path: partner_dir.join("config.toml"),
            gitignore_path: partner_dir.join(".gitignore"),
            context_path: root.join(CONTEXT_FILE_NAME),
            partner_dir,
            root,
        }
    }
}

/// Options for `init_config`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config file.
    pub force: bool,
}

/// Create `.partner/config.toml` with default settings.
///
/// Fails if the config already exists unless `options.force` is set.
pub fn init_config(root: &Path, options: &InitOptions) -> Result<ProjectPaths> {
    let paths = ProjectPaths::new(root);
    if paths.partner_dir.exists() && !paths.partner_dir.is_dir() {
        return Err(anyhow!("init: .partner exists but is not a directory"));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    fs::create_dir_all(&paths.partner_dir)
        .with_context(|| format!("create directory {}", paths.partner_dir.display()))?;
    fs::write(&paths.gitignore_path, PARTNER_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &SessionConfig::default())?;

    Ok(paths)
}

const PARTNER_GITIGNORE: &str = "*.tmp\n";
