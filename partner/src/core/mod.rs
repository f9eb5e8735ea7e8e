//! Deterministic, pure logic shared by the session.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures (and take the current time as an argument where it matters)
//! so every rule here is testable in isolation.

pub mod gate;
pub mod interpreter;
pub mod prompt;
pub mod types;
