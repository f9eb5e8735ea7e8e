//! Side-effecting collaborators: filesystem, HTTP backend, human approval.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

pub mod backend;
pub mod config;
pub mod context_store;
pub mod file_ops;
pub mod init;
pub mod listing;

/// Sibling temp file used while replacing `path`: `<name>.tmp`.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` next to `path` and rename it into place, so readers only
/// ever see the previous file or the complete new one.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    if path.file_name().is_none() {
        return Err(anyhow!("path missing file name {}", path.display()));
    }
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
