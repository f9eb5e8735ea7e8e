//! Turn orchestration: one `submit` is one full turn.
//!
//! A turn assembles the prompt from the stored context, calls the backend,
//! interprets the reply, and persists the updated context before returning.
//! While a confirmation is pending every non-meta input is routed through the
//! [`ConfirmationGate`] instead, and ordinary prompts are never sent.
//!
//! A session is single-owner: all operations take `&mut self`, so two turns can
//! never run concurrently on the same session. Use
//! [`SessionHandle`](crate::handle::SessionHandle) to drive a session from
//! another task.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::gate::{
    BACKEND_CONFIRMATION, ConfirmationGate, GateDecision, PendingConfirmation,
};
use crate::core::interpreter::{HeuristicInterpreter, ResponseInterpreter};
use crate::core::prompt::{PING_PROMPT, PromptInputs, build_follow_up, build_prompt};
use crate::core::types::{FileOperationRecord, ProjectContext, action, status};
use crate::io::backend::{Backend, BackendError, ErrorKind};
use crate::io::config::SessionConfig;
use crate::io::context_store::{ContextStore, LoadOrigin};
use crate::io::file_ops::{Approver, FileOperation, FileOperationGateway};
use crate::io::listing;

/// Shown instead of a reply when the backend could not be reached.
pub const BACKEND_APOLOGY: &str = "I'm sorry, but I couldn't get a reply from the model backend. \
Please check that it is running and reachable, then try again.";
pub const CANCELLED_NOTICE: &str = "Action cancelled by user. What would you like to do instead?";
pub const EXITED_NOTICE: &str = "Confirmation mode exited. What would you like to do?";
pub const IDLE_NOTICE: &str = "No confirmation is pending.";

/// What a turn produced for the human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReply {
    /// Backend reply for a normal turn, or for an approved follow-up.
    Answer { text: String },
    /// Backend reply that asks for approval; the gate is now awaiting.
    Pending { text: String, question: String },
    /// The pending action was declined.
    Cancelled { message: String },
    /// Confirmation mode was left without a decision.
    Exited { message: String },
    /// The answer was not understood; the gate is still awaiting.
    Clarify { message: String },
    /// A confirmation answer arrived while nothing was pending.
    Idle { message: String },
    /// The backend failed. The turn is not recorded in history.
    Failed { message: String, error: BackendError },
}

impl TurnReply {
    /// Text to show the human.
    pub fn text(&self) -> &str {
        match self {
            TurnReply::Answer { text } | TurnReply::Pending { text, .. } => text,
            TurnReply::Cancelled { message }
            | TurnReply::Exited { message }
            | TurnReply::Clarify { message }
            | TurnReply::Idle { message }
            | TurnReply::Failed { message, .. } => message,
        }
    }

    pub fn error(&self) -> Option<&BackendError> {
        match self {
            TurnReply::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TurnReply::Pending { .. })
    }
}

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub project_directory: String,
    pub goal: String,
    pub status: String,
    pub todo_count: usize,
    pub history_count: usize,
    pub pending_question: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub model: String,
    /// Set when the most recent save failed.
    pub save_error: Option<String>,
}

impl SessionStatus {
    /// Status of a stored context with no live session attached.
    pub fn of(context: &ProjectContext) -> Self {
        Self {
            project_directory: context.project_directory.clone(),
            goal: context.project_goal.clone(),
            status: context.current_status.clone(),
            todo_count: context.todo_list.len(),
            history_count: context.conversation_history.len(),
            pending_question: None,
            last_updated: context.last_updated,
            model: context.backend.model.clone(),
            save_error: None,
        }
    }
}

pub struct Session<B, I = HeuristicInterpreter> {
    store: ContextStore,
    context: ProjectContext,
    config: SessionConfig,
    backend: B,
    interpreter: I,
    gate: ConfirmationGate,
    origin: LoadOrigin,
    last_save_error: Option<String>,
}

impl<B: Backend> Session<B, HeuristicInterpreter> {
    /// Open a session with the heuristic reply interpreter.
    pub fn open(project_dir: impl Into<PathBuf>, config: SessionConfig, backend: B) -> Result<Self> {
        Self::open_with(project_dir, config, backend, HeuristicInterpreter)
    }
}

impl<B: Backend, I: ResponseInterpreter> Session<B, I> {
    /// Load (or create) the project context and persist it with the configured
    /// backend settings.
    pub fn open_with(
        project_dir: impl Into<PathBuf>,
        config: SessionConfig,
        backend: B,
        interpreter: I,
    ) -> Result<Self> {
        config.validate()?;
        let store = ContextStore::new(project_dir);
        let (mut context, origin) = store.load(config.backend_settings());
        context.backend = config.backend_settings();
        // Pending confirmations live in memory only and do not survive a restart.
        context.set_status(status::AWAITING_USER_INPUT);
        info!(
            dir = %store.project_dir().display(),
            origin = ?origin,
            history = context.conversation_history.len(),
            "session opened"
        );

        let mut session = Self {
            store,
            context,
            config,
            backend,
            interpreter,
            gate: ConfirmationGate::new(),
            origin,
            last_save_error: None,
        };
        session.persist();
        Ok(session)
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn project_dir(&self) -> &Path {
        self.store.project_dir()
    }

    pub fn context_path(&self) -> &Path {
        self.store.path()
    }

    /// How the context was obtained when the session opened.
    pub fn origin(&self) -> LoadOrigin {
        self.origin
    }

    /// The most recent save failure, cleared by the next successful save.
    pub fn last_save_error(&self) -> Option<&str> {
        self.last_save_error.as_deref()
    }

    /// Run one turn. Routes to the confirmation gate while one is pending.
    #[instrument(skip_all, fields(input_bytes = input.len()))]
    pub async fn submit(&mut self, input: &str) -> TurnReply {
        if self.gate.is_awaiting() {
            debug!("confirmation pending; routing input to gate");
            return self.respond_to_confirmation(input).await;
        }

        let listing = listing::describe(self.store.project_dir());
        let prompt = match build_prompt(&PromptInputs {
            context: &self.context,
            user_input: input,
            listing: &listing,
            history_window: self.config.history_window,
        }) {
            Ok(prompt) => prompt,
            Err(err) => {
                return failed(BackendError {
                    kind: ErrorKind::Other,
                    message: format!("{err:#}"),
                    attempts: 0,
                });
            }
        };

        match self.backend.call(&prompt).await {
            Ok(reply) => self.absorb_reply(input, reply),
            Err(error) => {
                warn!(kind = %error.kind, attempts = error.attempts, "turn failed");
                failed(error)
            }
        }
    }

    fn absorb_reply(&mut self, input: &str, reply: String) -> TurnReply {
        let interpretation = self.interpreter.interpret(&reply);
        let added = self.context.add_todos(&interpretation.work_items);
        if added > 0 {
            info!(added, total = self.context.todo_list.len(), "todo list updated");
        }
        let now = Utc::now();

        let turn = match interpretation.confirmation {
            Some(request) => {
                info!(indicator = %request.indicator, "backend asked for confirmation");
                self.gate.enter(PendingConfirmation {
                    action: BACKEND_CONFIRMATION.to_string(),
                    question: request.question.clone(),
                    created_at: now,
                });
                self.context.set_status(status::AWAITING_CONFIRMATION);
                self.context.record_exchange(
                    input,
                    &reply,
                    Some(action::CONFIRMATION_REQUESTED),
                    now,
                );
                TurnReply::Pending {
                    text: reply,
                    question: request.question,
                }
            }
            None => {
                self.context.set_status(status::AWAITING_USER_INPUT);
                self.context.record_exchange(input, &reply, None, now);
                TurnReply::Answer { text: reply }
            }
        };
        self.persist();
        turn
    }

    /// Answer a pending confirmation. Only an affirmative answer calls the
    /// backend, exactly once.
    #[instrument(skip_all)]
    pub async fn respond_to_confirmation(&mut self, input: &str) -> TurnReply {
        match self.gate.respond(input) {
            GateDecision::Idle => TurnReply::Idle {
                message: IDLE_NOTICE.to_string(),
            },
            GateDecision::Clarify => TurnReply::Clarify {
                message: format!(
                    "I didn't understand your response '{}'. Please respond with 'yes', 'no', or 'exit' to continue.",
                    input.trim()
                ),
            },
            GateDecision::Exit(_) => {
                info!("confirmation mode exited");
                self.context.set_status(status::AWAITING_USER_INPUT);
                self.persist();
                TurnReply::Exited {
                    message: EXITED_NOTICE.to_string(),
                }
            }
            GateDecision::Cancel(_) => {
                info!("pending action cancelled");
                self.context.set_status(status::AWAITING_USER_INPUT);
                self.context.record_exchange(
                    input,
                    CANCELLED_NOTICE,
                    Some(action::CANCELLED),
                    Utc::now(),
                );
                self.persist();
                TurnReply::Cancelled {
                    message: CANCELLED_NOTICE.to_string(),
                }
            }
            GateDecision::Proceed(pending) => self.proceed(input, &pending).await,
        }
    }

    async fn proceed(&mut self, input: &str, pending: &PendingConfirmation) -> TurnReply {
        info!("pending action approved; sending follow-up");
        self.context.set_status(status::AWAITING_USER_INPUT);
        let prompt = match build_follow_up(input, &pending.question) {
            Ok(prompt) => prompt,
            Err(err) => {
                self.persist();
                return failed(BackendError {
                    kind: ErrorKind::Other,
                    message: format!("{err:#}"),
                    attempts: 0,
                });
            }
        };

        let turn = match self.backend.call(&prompt).await {
            Ok(reply) => {
                let interpretation = self.interpreter.interpret(&reply);
                self.context.add_todos(&interpretation.work_items);
                if interpretation.needs_confirmation() {
                    debug!("follow-up asked again; gate stays ready");
                }
                self.context
                    .record_exchange(input, &reply, Some(action::CONFIRMED), Utc::now());
                TurnReply::Answer { text: reply }
            }
            Err(error) => {
                warn!(kind = %error.kind, "follow-up call failed");
                failed(error)
            }
        };
        self.persist();
        turn
    }

    /// Drop a pending confirmation without answering it.
    pub fn clear_confirmation(&mut self) -> Option<PendingConfirmation> {
        let cleared = self.gate.clear();
        if cleared.is_some() {
            self.context.set_status(status::AWAITING_USER_INPUT);
            self.persist();
        }
        cleared
    }

    pub fn current_status(&self) -> SessionStatus {
        SessionStatus {
            pending_question: self.gate.pending().map(|p| p.question.clone()),
            save_error: self.last_save_error.clone(),
            ..SessionStatus::of(&self.context)
        }
    }

    pub fn set_goal(&mut self, goal: &str) {
        self.context.project_goal = goal.trim().to_string();
        info!(goal = %self.context.project_goal, "project goal updated");
        self.persist();
    }

    pub fn todos(&self) -> impl Iterator<Item = &str> {
        self.context.todo_list.iter().map(String::as_str)
    }

    /// Current directory listing, as the backend would see it.
    pub fn listing(&self) -> String {
        listing::describe(self.store.project_dir())
    }

    /// Send a fixed probe prompt to check backend connectivity.
    pub async fn ping(&self) -> Result<String, BackendError> {
        self.backend.call(PING_PROMPT).await
    }

    /// Apply a human-approved file mutation and log it in the context.
    pub fn apply_file_operation<A: Approver + ?Sized>(
        &mut self,
        approver: &A,
        op: &FileOperation,
    ) -> FileOperationRecord {
        let gateway = FileOperationGateway::new(self.store.project_dir(), approver);
        let record = gateway.apply(op, Utc::now());
        self.context.record_file_operation(record.clone());
        self.persist();
        record
    }

    /// Log the outcome of a build run by a collaborator.
    pub fn record_build_attempt(&mut self, command: &str, success: bool, summary: &str) {
        self.context
            .record_build_attempt(command, success, summary, Utc::now());
        self.persist();
    }

    fn persist(&mut self) {
        match self.store.save(&mut self.context) {
            Ok(()) => self.last_save_error = None,
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(error = %detail, "failed to save project context");
                self.last_save_error = Some(detail);
            }
        }
    }
}

fn failed(error: BackendError) -> TurnReply {
    TurnReply::Failed {
        message: BACKEND_APOLOGY.to_string(),
        error,
    }
}
