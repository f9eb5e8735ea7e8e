//! End-to-end session scenarios over a scripted wire transport.
//!
//! These tests drive `Session::submit` through the real `BackendClient` retry
//! loop (with zero delays) and check what lands in `project_context.json`.

use std::fs;

use partner::core::types::{ProjectContext, action, status};
use partner::io::backend::{BackendClient, ErrorKind, RetryPolicy, TransportError};
use partner::io::config::SessionConfig;
use partner::io::context_store::LoadOrigin;
use partner::session::{BACKEND_APOLOGY, Session, TurnReply};
use partner::test_support::{ScriptedTransport, refused, timed_out};
use serde_json::{Value, json};

fn session_over(
    dir: &std::path::Path,
    script: Vec<Result<Value, TransportError>>,
) -> Session<BackendClient<ScriptedTransport>> {
    let cfg = SessionConfig::default();
    let backend =
        BackendClient::with_policy(ScriptedTransport::new(script), &cfg, RetryPolicy::immediate(3));
    Session::open(dir, cfg, backend).expect("open session")
}

fn reply(text: &str) -> Result<Value, TransportError> {
    Ok(json!({ "response": text }))
}

fn stored(dir: &std::path::Path) -> ProjectContext {
    let raw = fs::read_to_string(dir.join("project_context.json")).expect("read context");
    serde_json::from_str(&raw).expect("parse context")
}

/// Two refused connections, then a reply: the turn succeeds and is recorded once.
#[tokio::test]
async fn turn_survives_transient_connection_failures() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = session_over(
        temp.path(),
        vec![Err(refused()), Err(refused()), reply("Hello! What are we building?")],
    );

    let turn = session.submit("hello").await;

    assert_eq!(turn.text(), "Hello! What are we building?");
    let ctx = stored(temp.path());
    assert_eq!(ctx.conversation_history.len(), 1);
    assert_eq!(ctx.conversation_history[0].user_input, "hello");
    assert_eq!(ctx.conversation_history[0].action_taken, None);
}

/// Every attempt times out: the human gets the apology, history stays untouched.
#[tokio::test]
async fn exhausted_timeouts_surface_as_failed_turn() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = session_over(
        temp.path(),
        vec![Err(timed_out()), Err(timed_out()), Err(timed_out())],
    );

    let turn = session.submit("hello").await;

    match &turn {
        TurnReply::Failed { message, error } => {
            assert_eq!(message, BACKEND_APOLOGY);
            assert_eq!(error.kind, ErrorKind::Timeout);
            assert_eq!(error.attempts, 3);
        }
        other => panic!("expected failed turn, got {other:?}"),
    }
    assert!(stored(temp.path()).conversation_history.is_empty());
}

#[tokio::test]
async fn overlapping_todos_are_merged_without_duplicates() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = session_over(
        temp.path(),
        vec![
            reply("Plan:\n- TODO: set up CI\n- TODO: add README"),
            reply("Updated plan:\n- TODO: add README\n- TODO: tag release"),
        ],
    );

    session.submit("plan").await;
    session.submit("refine the plan").await;

    let todos: Vec<String> = stored(temp.path()).todo_list.into_iter().collect();
    assert_eq!(
        todos,
        vec!["- TODO: add README", "- TODO: set up CI", "- TODO: tag release"]
    );
}

#[tokio::test]
async fn corrupt_context_is_replaced_on_open() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("project_context.json"), "{\"project_goal\": ").expect("write");

    let mut session = session_over(temp.path(), vec![reply("Fresh start.")]);
    assert_eq!(session.origin(), LoadOrigin::Recovered);
    assert!(session.context().conversation_history.is_empty());

    session.submit("hi").await;
    assert_eq!(stored(temp.path()).conversation_history.len(), 1);
}

/// Confirmation request, a non-answer, then approval: exactly two wire calls
/// succeed and the follow-up carries the human's answer.
#[tokio::test]
async fn confirmation_flow_over_the_wire() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut session = session_over(
        temp.path(),
        vec![
            reply("I'd create src/main.rs with a CLI skeleton. Would you like me to create it?"),
            reply("Created src/main.rs.\n- TODO: add argument parsing"),
        ],
    );

    let first = session.submit("start the CLI").await;
    assert!(first.is_pending());
    assert_eq!(stored(temp.path()).current_status, status::AWAITING_CONFIRMATION);

    let unclear = session.submit("hmm").await;
    assert!(matches!(unclear, TurnReply::Clarify { .. }));

    let done = session.submit("Proceed").await;
    assert_eq!(done.text(), "Created src/main.rs.\n- TODO: add argument parsing");

    let ctx = stored(temp.path());
    assert_eq!(ctx.current_status, status::AWAITING_USER_INPUT);
    let actions: Vec<Option<&str>> = ctx
        .conversation_history
        .iter()
        .map(|entry| entry.action_taken.as_deref())
        .collect();
    assert_eq!(
        actions,
        vec![Some(action::CONFIRMATION_REQUESTED), Some(action::CONFIRMED)]
    );
    assert!(ctx.todo_list.contains("- TODO: add argument parsing"));
}

#[tokio::test]
async fn prompt_history_is_bounded() {
    let temp = tempfile::tempdir().expect("tempdir");
    let cfg = SessionConfig {
        history_window: 2,
        ..SessionConfig::default()
    };
    let script = (0..4).map(|i| reply(&format!("answer {i}"))).collect();
    let backend =
        BackendClient::with_policy(ScriptedTransport::new(script), &cfg, RetryPolicy::immediate(1));
    let mut session = Session::open(temp.path(), cfg, backend).expect("open");

    for i in 0..4 {
        session.submit(&format!("question {i}")).await;
    }

    let requests = session_requests(&session);
    let last = &requests[3].prompt;
    assert!(!last.contains("User: question 0"));
    assert!(last.contains("User: question 1"));
    assert!(last.contains("User: question 2"));
    assert!(last.contains("USER'S LATEST REQUEST:\nquestion 3"));
    assert_eq!(session.context().conversation_history.len(), 4);
}

fn session_requests(
    session: &Session<BackendClient<ScriptedTransport>>,
) -> Vec<partner::io::backend::GenerateRequest> {
    session.backend().transport().requests()
}

#[tokio::test]
async fn context_survives_restart() {
    let temp = tempfile::tempdir().expect("tempdir");
    {
        let mut session = session_over(temp.path(), vec![reply("Noted.\n* TODO: write docs")]);
        session.set_goal("Document the API");
        session.submit("remember this").await;
    }

    let session = session_over(temp.path(), Vec::new());
    assert_eq!(session.origin(), LoadOrigin::Existing);
    let status = session.current_status();
    assert_eq!(status.goal, "Document the API");
    assert_eq!(status.todo_count, 1);
    assert_eq!(status.history_count, 1);
    assert!(status.last_updated >= session.context().created_at);
}
