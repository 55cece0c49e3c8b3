//! Stable exit codes for taskrun CLI commands.

/// Command succeeded; for `exec`/`ask`, the plan completed.
pub const OK: i32 = 0;
/// Invalid arguments, config or plan file, or an unexpected error.
pub const INVALID: i32 = 1;
/// The plan ran and failed, or `check` found blocking violations.
pub const FAILED: i32 = 2;
/// Execution was cancelled before the plan finished.
pub const CANCELLED: i32 = 3;
