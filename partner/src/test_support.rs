//! Scripted test doubles for the backend and approval seams.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::io::backend::{Backend, BackendError, ErrorKind, GenerateRequest, Transport, TransportError};
use crate::io::file_ops::Approver;

/// Transport that replays a fixed script of wire outcomes, one per request.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Value, TransportError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<Value, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, request: &GenerateRequest) -> Result<Value, TransportError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".to_string())))
    }
}

/// Backend that replays scripted replies and records every prompt it sees.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn call(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(BackendError {
                    kind: ErrorKind::Other,
                    message: "script exhausted".to_string(),
                    attempts: 1,
                })
            })
    }
}

/// Approver that answers from a script and records each question with its
/// default. Declines once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedApprover {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<(String, bool)>>,
}

impl ScriptedApprover {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<(String, bool)> {
        self.questions.lock().expect("questions lock").clone()
    }
}

impl Approver for ScriptedApprover {
    fn approve(&self, question: &str, default_yes: bool) -> bool {
        self.questions
            .lock()
            .expect("questions lock")
            .push((question.to_string(), default_yes));
        self.answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .unwrap_or(false)
    }
}

/// Shorthand for a connection failure at the wire level.
pub fn refused() -> TransportError {
    TransportError::Connect("connection refused".to_string())
}

/// Shorthand for a timed-out attempt at the wire level.
pub fn timed_out() -> TransportError {
    TransportError::Timeout("operation timed out".to_string())
}
