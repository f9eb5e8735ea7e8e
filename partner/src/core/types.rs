//! Durable session types shared by the core and the context store.
//!
//! Every mutation takes the current time as an argument instead of reading the
//! clock, so the invariants below can be exercised deterministically in tests:
//!
//! - `last_updated >= created_at`, and `last_updated` never moves backwards.
//! - `conversation_history` timestamps are non-decreasing.
//! - `todo_list` holds no duplicates.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Values of [`ProjectContext::current_status`].
pub mod status {
    pub const AWAITING_USER_INPUT: &str = "awaiting_user_input";
    pub const AWAITING_CONFIRMATION: &str = "awaiting_confirmation";
}

/// Labels recorded in [`ConversationEntry::action_taken`].
pub mod action {
    pub const CONFIRMATION_REQUESTED: &str = "confirmation_requested";
    pub const CONFIRMED: &str = "confirmed";
    pub const CANCELLED: &str = "cancelled";
}

pub const DEFAULT_MODEL: &str = "claude-3.5-sonnet";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";

/// Backend identity recorded alongside the project so a reopened session can
/// show which model produced its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub model: String,
    pub endpoint: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// One completed exchange. Entries are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub agent_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperationKind {
    Create,
    Modify,
    Delete,
}

impl FileOperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileOperationKind::Create => "create",
            FileOperationKind::Modify => "modify",
            FileOperationKind::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperationOutcome {
    /// The human approved and the mutation was written.
    Applied,
    /// The human declined; nothing was touched.
    Declined,
    /// Approved (or not applicable) but the mutation could not be performed.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperationRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: FileOperationKind,
    /// Path relative to the project directory.
    pub path: String,
    pub outcome: FileOperationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAttempt {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub success: bool,
    pub summary: String,
}

/// Durable record of one project's session state (`project_context.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_directory: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationEntry>,
    #[serde(default)]
    pub project_goal: String,
    #[serde(default)]
    pub todo_list: BTreeSet<String>,
    #[serde(default = "default_status")]
    pub current_status: String,
    #[serde(default)]
    pub file_operations: Vec<FileOperationRecord>,
    #[serde(default)]
    pub build_attempts: Vec<BuildAttempt>,
    #[serde(default)]
    pub backend: BackendSettings,
}

fn default_status() -> String {
    status::AWAITING_USER_INPUT.to_string()
}

impl ProjectContext {
    /// Fresh context for `dir` with no history.
    pub fn new(dir: &Path, backend: BackendSettings, now: DateTime<Utc>) -> Self {
        Self {
            project_directory: dir.display().to_string(),
            created_at: now,
            last_updated: now,
            conversation_history: Vec::new(),
            project_goal: String::new(),
            todo_list: BTreeSet::new(),
            current_status: default_status(),
            file_operations: Vec::new(),
            build_attempts: Vec::new(),
            backend,
        }
    }

    /// Advance `last_updated` without ever moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.last_updated.max(self.created_at);
        self.last_updated = now.max(floor);
    }

    /// Append an exchange. Its timestamp is moved just past the previous entry
    /// when needed, so history timestamps strictly increase.
    pub fn record_exchange(
        &mut self,
        user_input: &str,
        agent_response: &str,
        action_taken: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let timestamp = match self.conversation_history.last() {
            Some(last) if now <= last.timestamp => last.timestamp + TimeDelta::nanoseconds(1),
            _ => now,
        };
        self.conversation_history.push(ConversationEntry {
            timestamp,
            user_input: user_input.to_string(),
            agent_response: agent_response.to_string(),
            action_taken: action_taken.map(str::to_string),
        });
    }

    /// Merge work items into the todo set. Returns how many were new.
    pub fn add_todos<I, S>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for item in items {
            let item = item.as_ref().trim();
            if item.is_empty() {
                continue;
            }
            if self.todo_list.insert(item.to_string()) {
                added += 1;
            }
        }
        added
    }

    /// The last `window` entries, oldest first.
    pub fn recent_history(&self, window: usize) -> &[ConversationEntry] {
        let start = self.conversation_history.len().saturating_sub(window);
        &self.conversation_history[start..]
    }

    pub fn set_status(&mut self, value: &str) {
        self.current_status = value.to_string();
    }

    pub fn record_file_operation(&mut self, record: FileOperationRecord) {
        self.file_operations.push(record);
    }

    pub fn record_build_attempt(
        &mut self,
        command: &str,
        success: bool,
        summary: &str,
        now: DateTime<Utc>,
    ) {
        self.build_attempts.push(BuildAttempt {
            timestamp: now,
            command: command.to_string(),
            success,
            summary: summary.to_string(),
        });
    }
}
