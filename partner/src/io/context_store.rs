//! Durable project context storage (`<project>/project_context.json`).
//!
//! A corrupt or unreadable record is never fatal: it is logged and replaced by
//! a fresh context. Saves go through a temp file and rename, so the stored file
//! is always either the previous or the new complete value.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use super::init::ProjectPaths;
use crate::core::types::{BackendSettings, ProjectContext};

/// How [`ContextStore::load`] obtained its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    /// A well-formed record was read.
    Existing,
    /// No record existed.
    Created,
    /// A record existed but could not be read or parsed; it was discarded.
    Recovered,
}

/// Owner of the context file for one project directory.
#[derive(Debug, Clone)]
pub struct ContextStore {
    project_dir: PathBuf,
    path: PathBuf,
}

impl ContextStore {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let path = ProjectPaths::new(&project_dir).context_path;
        Self { project_dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Load the stored context, or a fresh one when none exists or it is corrupt.
    ///
    /// `backend` seeds fresh contexts only; a stored record keeps its own.
    pub fn load(&self, backend: BackendSettings) -> (ProjectContext, LoadOrigin) {
        debug!(path = %self.path.display(), "loading project context");
        self.remove_stale_temp();
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no stored context; starting fresh");
                return (self.fresh(backend), LoadOrigin::Created);
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "unreadable context; starting fresh");
                return (self.fresh(backend), LoadOrigin::Recovered);
            }
        };

        match serde_json::from_str::<ProjectContext>(&contents) {
            Ok(ctx) => {
                debug!(
                    history = ctx.conversation_history.len(),
                    todos = ctx.todo_list.len(),
                    "project context loaded"
                );
                (ctx, LoadOrigin::Existing)
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt context; starting fresh");
                (self.fresh(backend), LoadOrigin::Recovered)
            }
        }
    }

    /// Stamp `last_updated` and persist atomically as 2-space indented JSON.
    pub fn save(&self, ctx: &mut ProjectContext) -> Result<()> {
        ctx.touch(Utc::now());
        debug!(path = %self.path.display(), last_updated = %ctx.last_updated, "saving project context");
        let mut buf = serde_json::to_string_pretty(ctx).context("serialize project context")?;
        buf.push('\n');
        super::write_atomic(&self.path, &buf)
            .with_context(|| format!("save project context {}", self.path.display()))
    }

    /// Remove a temp file left behind by a save that never reached its rename.
    fn remove_stale_temp(&self) {
        let temp = super::temp_path_for(&self.path);
        match fs::remove_file(&temp) {
            Ok(()) => warn!(path = %temp.display(), "removed temp file from an interrupted save"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %temp.display(), error = %err, "could not remove stale temp file"),
        }
    }

    fn fresh(&self, backend: BackendSettings) -> ProjectContext {
        ProjectContext::new(&self.project_dir, backend, Utc::now())
    }
}
