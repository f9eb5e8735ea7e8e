//! Confirmation gate: suspends ordinary turns while a backend-proposed action
//! waits for a human yes/no.
//!
//! The gate only decides. The session performs the follow-up backend call on
//! [`GateDecision::Proceed`] and never calls the backend for any other decision.

use chrono::{DateTime, Utc};

pub const AFFIRMATIVE: [&str; 5] = ["yes", "y", "proceed", "continue", "approve"];
pub const NEGATIVE: [&str; 5] = ["no", "n", "cancel", "stop", "deny"];
pub const EXIT: [&str; 3] = ["exit", "quit", "q"];

/// Action kind recorded for approvals requested by the backend in prose.
pub const BACKEND_CONFIRMATION: &str = "backend_confirmation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub action: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GateState {
    #[default]
    Ready,
    AwaitingConfirmation(PendingConfirmation),
}

/// Outcome of feeding human input to an awaiting gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Approved; carries the confirmation that was cleared.
    Proceed(PendingConfirmation),
    /// Declined; no backend call follows.
    Cancel(PendingConfirmation),
    /// The human left confirmation mode without deciding.
    Exit(PendingConfirmation),
    /// Input was not recognized; the gate keeps waiting.
    Clarify,
    /// Nothing was pending.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Affirmative,
    Negative,
    Exit,
    Unrecognized,
}

fn classify(input: &str) -> Answer {
    let normalized = input.trim().to_lowercase();
    let normalized = normalized.as_str();
    if AFFIRMATIVE.contains(&normalized) {
        Answer::Affirmative
    } else if NEGATIVE.contains(&normalized) {
        Answer::Negative
    } else if EXIT.contains(&normalized) {
        Answer::Exit
    } else {
        Answer::Unrecognized
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationGate {
    state: GateState,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, GateState::AwaitingConfirmation(_))
    }

    pub fn pending(&self) -> Option<&PendingConfirmation> {
        match &self.state {
            GateState::AwaitingConfirmation(pending) => Some(pending),
            GateState::Ready => None,
        }
    }

    /// Start waiting for approval. A confirmation that is already pending is
    /// replaced so at most one is ever live.
    pub fn enter(&mut self, pending: PendingConfirmation) -> Option<PendingConfirmation> {
        let previous = self.clear();
        self.state = GateState::AwaitingConfirmation(pending);
        previous
    }

    /// Drop any pending confirmation and return to `Ready`.
    pub fn clear(&mut self) -> Option<PendingConfirmation> {
        match std::mem::take(&mut self.state) {
            GateState::AwaitingConfirmation(pending) => Some(pending),
            GateState::Ready => None,
        }
    }

    /// Apply a human answer. Only unrecognized input leaves the gate awaiting.
    pub fn respond(&mut self, input: &str) -> GateDecision {
        if !self.is_awaiting() {
            return GateDecision::Idle;
        }
        let answer = classify(input);
        if answer == Answer::Unrecognized {
            return GateDecision::Clarify;
        }
        let Some(pending) = self.clear() else {
            return GateDecision::Idle;
        };
        match answer {
            Answer::Affirmative => GateDecision::Proceed(pending),
            Answer::Negative => GateDecision::Cancel(pending),
            Answer::Exit | Answer::Unrecognized => GateDecision::Exit(pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(question: &str) -> PendingConfirmation {
        PendingConfirmation {
            action: BACKEND_CONFIRMATION.to_string(),
            question: question.to_string(),
            created_at: Utc::now(),
        }
    }

    fn awaiting() -> ConfirmationGate {
        let mut gate = ConfirmationGate::new();
        gate.enter(pending("Should I proceed?"));
        gate
    }

    #[test]
    fn starts_ready() {
        let gate = ConfirmationGate::new();
        assert_eq!(gate.state(), &GateState::Ready);
        assert!(gate.pending().is_none());
    }

    #[test]
    fn affirmative_tokens_proceed_and_reset() {
        for token in AFFIRMATIVE {
            let mut gate = awaiting();
            let decision = gate.respond(&format!("  {}  ", token.to_uppercase()));
            assert!(matches!(decision, GateDecision::Proceed(_)), "{token}");
            assert!(!gate.is_awaiting());
        }
    }

    #[test]
    fn negative_tokens_cancel_and_reset() {
        for token in NEGATIVE {
            let mut gate = awaiting();
            assert!(matches!(gate.respond(token), GateDecision::Cancel(_)), "{token}");
            assert!(!gate.is_awaiting());
        }
    }

    #[test]
    fn exit_tokens_leave_confirmation_mode() {
        for token in EXIT {
            let mut gate = awaiting();
            assert!(matches!(gate.respond(token), GateDecision::Exit(_)), "{token}");
            assert!(!gate.is_awaiting());
        }
    }

    #[test]
    fn unrecognized_input_keeps_waiting() {
        let mut gate = awaiting();
        assert_eq!(gate.respond("maybe later"), GateDecision::Clarify);
        assert_eq!(gate.respond("yes please"), GateDecision::Clarify);
        assert!(gate.is_awaiting());
        assert_eq!(
            gate.pending().map(|p| p.question.as_str()),
            Some("Should I proceed?")
        );
    }

    #[test]
    fn respond_when_ready_is_idle() {
        let mut gate = ConfirmationGate::new();
        assert_eq!(gate.respond("yes"), GateDecision::Idle);
    }

    #[test]
    fn enter_replaces_existing_pending() {
        let mut gate = awaiting();
        let previous = gate.enter(pending("second"));
        assert_eq!(previous.map(|p| p.question), Some("Should I proceed?".to_string()));
        assert_eq!(gate.pending().map(|p| p.question.as_str()), Some("second"));
    }

    #[test]
    fn clear_returns_pending() {
        let mut gate = awaiting();
        assert!(gate.clear().is_some());
        assert!(gate.clear().is_none());
    }
}
