//! Turn prompt assembly.
//!
//! The prompt is rendered from embedded minijinja templates. Only the last
//! `history_window` exchanges are included, so prompt size stays bounded as the
//! conversation grows. Identical inputs always render identical prompts.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::ProjectContext;

const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const FOLLOW_UP_TEMPLATE: &str = include_str!("prompts/follow_up.md");

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Prompt the connectivity check sends.
pub const PING_PROMPT: &str = "Please respond with 'Connection test successful!' and nothing else.";

/// Everything a turn prompt is built from.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub context: &'a ProjectContext,
    pub user_input: &'a str,
    /// Rendered directory listing of the project root.
    pub listing: &'a str,
    pub history_window: usize,
}

#[derive(Debug, Serialize)]
struct HistoryView<'a> {
    timestamp: String,
    user_input: &'a str,
    agent_response: &'a str,
}

fn engine() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("turn", TURN_TEMPLATE)
        .context("load turn template")?;
    env.add_template("follow_up", FOLLOW_UP_TEMPLATE)
        .context("load follow-up template")?;
    Ok(env)
}

/// Render the request for an ordinary turn.
pub fn build_prompt(inputs: &PromptInputs<'_>) -> Result<String> {
    let ctx = inputs.context;
    let goal = match ctx.project_goal.trim() {
        "" => "Not defined",
        goal => goal,
    };
    let history: Vec<HistoryView<'_>> = ctx
        .recent_history(inputs.history_window)
        .iter()
        .map(|entry| HistoryView {
            timestamp: entry.timestamp.to_rfc3339(),
            user_input: entry.user_input.trim(),
            agent_response: entry.agent_response.trim(),
        })
        .collect();
    let listing = match inputs.listing.trim() {
        "" => "(empty)",
        listing => listing,
    };

    let env = engine()?;
    let template = env.get_template("turn")?;
    let rendered = template
        .render(context! {
            directory => ctx.project_directory.as_str(),
            goal => goal,
            status => ctx.current_status.as_str(),
            todos => ctx.todo_list.iter().collect::<Vec<_>>(),
            history => history,
            listing => listing,
            input => inputs.user_input.trim(),
        })
        .context("render turn prompt")?;
    Ok(rendered)
}

/// Render the synthetic request sent after the human approves a pending action.
pub fn build_follow_up(answer: &str, question: &str) -> Result<String> {
    let env = engine()?;
    let template = env.get_template("follow_up")?;
    let rendered = template
        .render(context! {
            answer => answer.trim(),
            question => question.trim(),
        })
        .context("render follow-up prompt")?;
    Ok(rendered.trim_end().to_string())
}
