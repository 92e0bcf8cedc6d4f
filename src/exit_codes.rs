//! Exit code policy for migverify.
//!
//! - `0` = every assertion passed
//! - `1` = at least one assertion failed or could not be evaluated, or a
//!   fatal precondition (missing tag, unreadable config) aborted the run
//! - `130` = interrupted by Ctrl+C
//!
//! CI callers only need to distinguish zero from non-zero.

/// Exit code: all assertions passed
pub const PASSED: i32 = 0;

/// Exit code: assertion failures or a fatal precondition
pub const FAILED: i32 = 1;

/// Exit code: interrupted by Ctrl+C (SIGINT)
pub const INTERRUPTED: i32 = 130;
