//! Diagnostic tracing on stderr.
//!
//! Retries, gate transitions, context saves and recoveries are traced here so a
//! misbehaving backend can be investigated with `RUST_LOG`. None of it reaches
//! stdout, which carries only the conversation and command output. The durable
//! record of a project is `project_context.json`, written by
//! `io::context_store` regardless of the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset: only corrupt-context recoveries,
/// failed saves and backend retries show up.
const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber. Call once, at the start of `main`.
///
/// ```bash
/// # Watch each backend attempt and the retry delays between them.
/// RUST_LOG=partner::io::backend=info partner chat
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
