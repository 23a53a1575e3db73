//! Task-driven LLM automation orchestrator.
//!
//! This crate turns a JSON task list into code changes: each pending
//! task is sent to a model gateway, the returned file operations are
//! applied under guard rules, and (optionally) committed to a per-task
//! git branch. A separate merge loop folds task branches into the base
//! branch, treating conflicts as reportable outcomes. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (types, patching, reports).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, network,
//!   logs). Isolated to enable scripted gateways in tests.
//!
//! Orchestration modules ([`run`], [`runner`], [`merge`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod merge;
pub mod run;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
