//! Drive a [`Session`] from other tasks.
//!
//! The session runs on its own task and processes one command at a time, so
//! turns are serialized no matter how many clones of the handle exist. A caller
//! awaiting a reply never blocks anything but itself.

use anyhow::{Context, Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::gate::PendingConfirmation;
use crate::core::interpreter::ResponseInterpreter;
use crate::io::backend::{Backend, BackendError};
use crate::session::{Session, SessionStatus, TurnReply};

const QUEUE_DEPTH: usize = 16;

enum Command {
    Submit {
        input: String,
        reply: oneshot::Sender<TurnReply>,
    },
    Respond {
        input: String,
        reply: oneshot::Sender<TurnReply>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    SetGoal {
        goal: String,
        reply: oneshot::Sender<()>,
    },
    Ping {
        reply: oneshot::Sender<Result<String, BackendError>>,
    },
    Todos {
        reply: oneshot::Sender<Vec<String>>,
    },
    Listing {
        reply: oneshot::Sender<String>,
    },
    ClearConfirmation {
        reply: oneshot::Sender<Option<PendingConfirmation>>,
    },
}

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Move `session` onto a new task. The task ends when every handle is dropped.
    pub fn spawn<B, I>(session: Session<B, I>) -> (Self, JoinHandle<()>)
    where
        B: Backend + 'static,
        I: ResponseInterpreter + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let task = tokio::spawn(run(session, rx));
        (Self { tx }, task)
    }

    pub async fn submit(&self, input: &str) -> Result<TurnReply> {
        self.request(|reply| Command::Submit {
            input: input.to_string(),
            reply,
        })
        .await
    }

    pub async fn respond_to_confirmation(&self, input: &str) -> Result<TurnReply> {
        self.request(|reply| Command::Respond {
            input: input.to_string(),
            reply,
        })
        .await
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn set_goal(&self, goal: &str) -> Result<()> {
        self.request(|reply| Command::SetGoal {
            goal: goal.to_string(),
            reply,
        })
        .await
    }

    pub async fn ping(&self) -> Result<Result<String, BackendError>> {
        self.request(|reply| Command::Ping { reply }).await
    }

    pub async fn todos(&self) -> Result<Vec<String>> {
        self.request(|reply| Command::Todos { reply }).await
    }

    pub async fn listing(&self) -> Result<String> {
        self.request(|reply| Command::Listing { reply }).await
    }

    pub async fn clear_confirmation(&self) -> Result<Option<PendingConfirmation>> {
        self.request(|reply| Command::ClearConfirmation { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| anyhow!("session task has stopped"))?;
        rx.await.context("session task dropped the reply")
    }
}

async fn run<B, I>(mut session: Session<B, I>, mut rx: mpsc::Receiver<Command>)
where
    B: Backend,
    I: ResponseInterpreter,
{
    while let Some(command) = rx.recv().await {
        // A dropped receiver only means the caller stopped waiting.
        match command {
            Command::Submit { input, reply } => {
                let _ = reply.send(session.submit(&input).await);
            }
            Command::Respond { input, reply } => {
                let _ = reply.send(session.respond_to_confirmation(&input).await);
            }
            Command::Status { reply } => {
                let _ = reply.send(session.current_status());
            }
            Command::SetGoal { goal, reply } => {
                session.set_goal(&goal);
                let _ = reply.send(());
            }
            Command::Ping { reply } => {
                let _ = reply.send(session.ping().await);
            }
            Command::Todos { reply } => {
                let _ = reply.send(session.todos().map(str::to_string).collect());
            }
            Command::Listing { reply } => {
                let _ = reply.send(session.listing());
            }
            Command::ClearConfirmation { reply } => {
                let _ = reply.send(session.clear_confirmation());
            }
        }
    }
    debug!("all session handles dropped; session task ending");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::SessionConfig;
    use crate::test_support::ScriptedBackend;

    #[tokio::test]
    async fn handle_serializes_turns_through_the_gate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backend = ScriptedBackend::new(vec![
            Ok("Should I proceed with the refactor?".to_string()),
            Ok("Refactor done.".to_string()),
        ]);
        let session = Session::open(temp.path(), SessionConfig::default(), backend).expect("open");
        let (handle, task) = SessionHandle::spawn(session);

        let first = handle.submit("refactor").await.expect("submit");
        assert!(first.is_pending());
        let status = handle.status().await.expect("status");
        assert!(status.pending_question.is_some());

        let second = handle.respond_to_confirmation("yes").await.expect("respond");
        assert_eq!(second.text(), "Refactor done.");

        handle.set_goal("Tidy the codebase").await.expect("goal");
        let status = handle.status().await.expect("status");
        assert_eq!(status.goal, "Tidy the codebase");
        assert_eq!(status.history_count, 2);

        drop(handle);
        task.await.expect("task ends");
    }

    #[tokio::test]
    async fn stopped_task_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let session = Session::open(
            temp.path(),
            SessionConfig::default(),
            ScriptedBackend::new(Vec::new()),
        )
        .expect("open");
        let (handle, task) = SessionHandle::spawn(session);
        task.abort();
        let _ = task.await;

        assert!(handle.status().await.is_err());
    }
}
