//! Heuristic interpretation of free-text backend replies.
//!
//! The backend answers in prose, so work items and approval requests are
//! recovered by line and phrase scanning. The scan is approximate; callers
//! depend on the [`ResponseInterpreter`] trait so an exact implementation (for a
//! backend with structured output) can replace [`HeuristicInterpreter`].

/// Phrases that mark a reply as asking for approval, in priority order.
///
/// The first phrase in this list that occurs anywhere in the reply wins, even
/// when a later phrase occurs earlier in the text.
pub const CONFIRMATION_INDICATORS: [&str; 11] = [
    "should i proceed",
    "shall i proceed",
    "do you want me to",
    "would you like me to",
    "can i proceed",
    "may i proceed",
    "do you approve",
    "should i continue",
    "shall i continue",
    "do you want me to continue",
    "would you like me to continue",
];

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

/// An approval request detected in a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    /// What triggered the request (for the heuristic interpreter, the
    /// matched phrase).
    pub indicator: String,
    /// Human-facing excerpt around the match.
    pub question: String,
}

/// Result of interpreting one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation {
    /// Candidate todo lines, trimmed, in reply order, without duplicates.
    pub work_items: Vec<String>,
    pub confirmation: Option<ConfirmationRequest>,
}

impl Interpretation {
    pub fn needs_confirmation(&self) -> bool {
        self.confirmation.is_some()
    }
}

/// Extracts actionable structure from a backend reply.
pub trait ResponseInterpreter {
    fn interpret(&self, reply: &str) -> Interpretation;
}

/// Line/phrase scanning interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicInterpreter;

impl ResponseInterpreter for HeuristicInterpreter {
    fn interpret(&self, reply: &str) -> Interpretation {
        Interpretation {
            work_items: extract_work_items(reply),
            confirmation: detect_confirmation(reply),
        }
    }
}

/// Collect bullet or numbered lines that mention a todo or task.
pub fn extract_work_items(reply: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for line in reply.lines() {
        let line = line.trim();
        if !is_list_line(line) {
            continue;
        }
        let lower = line.to_lowercase();
        if !(lower.contains("todo") || lower.contains("task")) {
            continue;
        }
        if !items.iter().any(|existing| existing == line) {
            items.push(line.to_string());
        }
    }
    items
}

fn is_list_line(line: &str) -> bool {
    if line.starts_with(['-', '*', '•']) {
        return true;
    }
    line.starts_with(|c: char| c.is_ascii_digit()) && line.contains(". ")
}

/// Find the highest-priority approval phrase and excerpt the text around it.
pub fn detect_confirmation(reply: &str) -> Option<ConfirmationRequest> {
    // Lowercasing can change byte lengths, so match per character to keep
    // offsets aligned with the original reply.
    let original: Vec<char> = reply.chars().collect();
    let lowered: Vec<char> = original.iter().map(|c| lower_char(*c)).collect();

    CONFIRMATION_INDICATORS.iter().find_map(|indicator| {
        let needle: Vec<char> = indicator.chars().collect();
        let start = find_chars(&lowered, &needle)?;
        let from = start.saturating_sub(SNIPPET_BEFORE);
        let to = (start + SNIPPET_AFTER).min(original.len());
        let question: String = original[from..to].iter().collect();
        Some(ConfirmationRequest {
            indicator: indicator.to_string(),
            question: question.trim().to_string(),
        })
    })
}

fn lower_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => c,
    }
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
