//! Exit codes for `sl`.
//!
//! Failures raised by the core carry their own code (`LedgerError::exit_code`):
//! 1 declared state, 3 integrity, 4 fetch, 5 local storage, 6 lockfile,
//! 130 cancelled.

pub const SUCCESS: i32 = 0;
pub const CHECK_FAILED: i32 = 1; // Unknown references found
pub const INTERNAL_ERROR: i32 = 2; // Not a core error (usage, unexpected io)
