//! Stable exit codes for relay CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration, pipeline, input, or any other setup error.
pub const INVALID: i32 = 1;
/// A pipeline step failed; the run is recorded as `failed`.
pub const STEP_FAILED: i32 = 2;
/// The run was cancelled between steps.
pub const CANCELLED: i32 = 3;
