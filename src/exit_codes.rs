//! Stable exit codes for orchestrator CLI commands.

/// Every processed task resolved successfully (or there was nothing to do).
pub const OK: i32 = 0;
/// At least one task failed, or the command hit a runtime error.
pub const TASKS_FAILED: i32 = 1;
/// Configuration or precondition error; nothing was mutated.
pub const CONFIG: i32 = 2;
