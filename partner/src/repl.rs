//! Interactive loop: reads lines, handles meta commands locally, and sends
//! everything else to the session.

use std::io::Write;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::core::gate::EXIT;
use crate::handle::SessionHandle;
use crate::session::{SessionStatus, TurnReply};

pub const HELP: &str = "\
Commands:
- help: Show this help message
- status: Show current project status
- todo: Show current TODO list
- files, ls: Show current directory contents
- test: Test the backend connection
- confirm: Show confirmation status
- clear: Clear confirmation mode
- goal <text>: Set the project goal (no text shows it)
- exit, quit, q: Exit the program

Anything else is sent to the model. Changes are only made after you approve them.";

/// Commands handled without a backend turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Help,
    Status,
    Todo,
    Files,
    Test,
    Confirm,
    Clear,
    Goal(String),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Empty,
    Meta(MetaCommand),
    Turn(String),
}

/// Classify one input line. Exit words only quit when nothing is pending;
/// otherwise they are answers for the confirmation gate.
pub fn classify(input: &str, awaiting: bool) -> Line {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Line::Empty;
    }
    let lowered = trimmed.to_lowercase();
    let meta = match lowered.as_str() {
        "help" => MetaCommand::Help,
        "status" => MetaCommand::Status,
        "todo" => MetaCommand::Todo,
        "files" | "ls" => MetaCommand::Files,
        "test" => MetaCommand::Test,
        "confirm" => MetaCommand::Confirm,
        "clear" => MetaCommand::Clear,
        "goal" => MetaCommand::Goal(String::new()),
        word if EXIT.contains(&word) && !awaiting => MetaCommand::Quit,
        _ => match trimmed.get(..5) {
            Some(head) if head.eq_ignore_ascii_case("goal ") => {
                MetaCommand::Goal(trimmed[5..].trim().to_string())
            }
            _ => return Line::Turn(trimmed.to_string()),
        },
    };
    Line::Meta(meta)
}

pub fn render_status(status: &SessionStatus) -> String {
    let goal = if status.goal.is_empty() {
        "Not defined"
    } else {
        status.goal.as_str()
    };
    let state = match &status.pending_question {
        Some(_) => "AWAITING CONFIRMATION",
        None => "Ready",
    };
    format!(
        "Project Status:\n\
         - Directory: {}\n\
         - Goal: {goal}\n\
         - Status: {}\n\
         - TODO Items: {}\n\
         - Conversations: {}\n\
         - Last Updated: {}\n\
         - Model: {}\n\
         - Agent State: {state}",
        status.project_directory,
        status.status,
        status.todo_count,
        status.history_count,
        status.last_updated.to_rfc3339(),
        status.model,
    )
}

pub fn render_todos(todos: &[String]) -> String {
    if todos.is_empty() {
        return "No TODO items yet.".to_string();
    }
    let mut out = String::from("TODO List:");
    for (index, item) in todos.iter().enumerate() {
        out.push_str(&format!("\n{}. {item}", index + 1));
    }
    out
}

fn render_turn(reply: &TurnReply) -> String {
    match reply {
        TurnReply::Pending { text, question } => format!(
            "Partner: {text}\n\nConfirmation required:\n   {question}\n\
             Please respond with 'yes' or 'no' to continue. \
             You can also type 'exit' to cancel or 'clear' to reset."
        ),
        TurnReply::Failed { message, error } => format!("Partner: {message}\n({error})"),
        other => format!("Partner: {}", other.text()),
    }
}

/// Run the loop until a quit command or end of input.
pub async fn run<R, W>(handle: &SessionHandle, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let status = handle.status().await?;
    writeln!(out, "Partner ready.")?;
    writeln!(out, "Working in: {}", status.project_directory)?;
    writeln!(out, "Type 'help' for commands, 'exit' to quit.")?;

    let mut lines = input.lines();
    loop {
        let awaiting = handle.status().await?.pending_question.is_some();
        let prompt = if awaiting { "Confirm (yes/no): " } else { "You: " };
        write!(out, "\n{prompt}")?;
        out.flush().context("flush prompt")?;

        let Some(line) = lines.next_line().await.context("read input")? else {
            writeln!(out, "\nEnd of input. Goodbye!")?;
            break;
        };

        match classify(&line, awaiting) {
            Line::Empty => continue,
            Line::Turn(text) => {
                let reply = handle.submit(&text).await?;
                writeln!(out, "{}", render_turn(&reply))?;
                if let Some(detail) = handle.status().await?.save_error {
                    writeln!(out, "Warning: project context was not saved: {detail}")?;
                }
            }
            Line::Meta(MetaCommand::Quit) => {
                writeln!(out, "Goodbye! Your project context has been saved.")?;
                break;
            }
            Line::Meta(meta) => {
                debug!(?meta, "meta command");
                handle_meta(handle, meta, out).await?;
            }
        }
    }
    Ok(())
}

async fn handle_meta<W: Write>(handle: &SessionHandle, meta: MetaCommand, out: &mut W) -> Result<()> {
    match meta {
        MetaCommand::Help => writeln!(out, "{HELP}")?,
        MetaCommand::Status => writeln!(out, "{}", render_status(&handle.status().await?))?,
        MetaCommand::Todo => writeln!(out, "{}", render_todos(&handle.todos().await?))?,
        MetaCommand::Files => writeln!(out, "Directory contents:\n{}", handle.listing().await?)?,
        MetaCommand::Test => match handle.ping().await? {
            Ok(reply) => writeln!(out, "Backend connection OK: {reply}")?,
            Err(err) => writeln!(out, "Backend connection failed: {err}")?,
        },
        MetaCommand::Confirm => match handle.status().await?.pending_question {
            Some(question) => writeln!(out, "Currently awaiting confirmation for: {question}")?,
            None => writeln!(out, "No confirmation pending.")?,
        },
        MetaCommand::Clear => match handle.clear_confirmation().await? {
            Some(_) => writeln!(out, "Confirmation mode cleared.")?,
            None => writeln!(out, "No confirmation mode to clear.")?,
        },
        MetaCommand::Goal(text) if text.is_empty() => {
            let goal = handle.status().await?.goal;
            if goal.is_empty() {
                writeln!(out, "Project goal: Not defined")?;
            } else {
                writeln!(out, "Project goal: {goal}")?;
            }
        }
        MetaCommand::Goal(text) => {
            handle.set_goal(&text).await?;
            writeln!(out, "Project goal set: {text}")?;
        }
        MetaCommand::Quit => {}
    }
    Ok(())
}
