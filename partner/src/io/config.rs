//! Session configuration stored under `.partner/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::prompt::DEFAULT_HISTORY_WINDOW;
use crate::core::types::{BackendSettings, DEFAULT_ENDPOINT, DEFAULT_MODEL};

/// Explicit session configuration (TOML), passed to the session at construction.
///
/// This file is intended to be edited by humans. Missing fields default to the
/// values that work against a local Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Full URL the generate request is POSTed to.
    pub endpoint: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Total attempts per backend call (not additional retries).
    pub max_retries: u32,

    /// Per-attempt request timeout in seconds.
    pub request_timeout_secs: u64,

    pub temperature: f32,

    pub top_p: f32,

    /// Upper bound on generated tokens (`num_predict` on the wire).
    pub max_output_tokens: u32,

    pub stop_sequences: Vec<String>,

    /// Fixed wait after a timed-out attempt.
    pub timeout_retry_delay_ms: u64,

    /// Base of the exponential backoff after connection or transport failures.
    /// Attempt `i` (0-based) waits `backoff_base_ms * 2^i`.
    pub backoff_base_ms: u64,

    /// Number of past exchanges included in each prompt.
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_retries: 3,
            request_timeout_secs: 120,
            temperature: 0.1,
            top_p: 0.9,
            max_output_tokens: 2000,
            stop_sequences: vec![
                "\n\nHuman:".to_string(),
                "\n\nUser:".to_string(),
                "Human:".to_string(),
                "User:".to_string(),
            ],
            timeout_retry_delay_ms: 5_000,
            backoff_base_ms: 1_000,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("endpoint must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must not be empty"));
        }
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!("temperature must be within 0.0..=2.0"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(anyhow!("top_p must be within 0.0..=1.0"));
        }
        if self.max_output_tokens == 0 {
            return Err(anyhow!("max_output_tokens must be > 0"));
        }
        if self.history_window == 0 {
            return Err(anyhow!("history_window must be > 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SessionConfig::default()`.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        let cfg = SessionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SessionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
