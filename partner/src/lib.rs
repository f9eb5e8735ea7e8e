//! Local coding partner backed by a text-generation server.
//!
//! A [`session::Session`] carries a human through a multi-turn collaboration on
//! one project directory. Every turn is grounded in a durable project context
//! (goal, TODO list, conversation history) that survives restarts, and any reply
//! that asks for permission suspends ordinary turns until the human answers.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (context model, prompt assembly,
//!   reply interpretation, confirmation gate). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (context file, config, directory
//!   listing, backend HTTP, approved file mutations). Isolated behind traits so
//!   tests can script them.
//!
//! Orchestration modules ([`session`], [`handle`], [`repl`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod handle;
pub mod io;
pub mod logging;
pub mod repl;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
