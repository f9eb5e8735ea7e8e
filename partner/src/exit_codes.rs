//! Stable exit codes for partner CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid arguments/config or other errors.
pub const INVALID: i32 = 1;
/// `partner ping` could not get a reply from the backend.
pub const BACKEND_UNAVAILABLE: i32 = 2;
