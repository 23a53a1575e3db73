//! Shared types for the orchestrator core.
//!
//! These types define stable contracts between components. Expected
//! conditions (guard skips, patch fallbacks, merge conflicts) are values
//! here, never control-flow errors.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task within a run.
///
/// Transitions are one-way: `Pending` -> `Done` or `Pending` -> `Failed`.
/// Resolved tasks are never revisited in the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// A unit of work describing a desired code change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, also used to key feedback logs and branches.
    pub id: String,
    pub title: String,
    /// Free text instructing the model.
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Kind tag forwarded to the gateway (e.g. "code").
    #[serde(default = "default_kind", rename = "type")]
    pub kind: String,
    /// UTC timestamp written when the task completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Branch the task's changes were committed to (git mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

fn default_kind() -> String {
    "code".to_string()
}

/// One atomic file mutation instruction from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Operation {
    /// Create or truncate the target and write `content`.
    Write { path: String, content: String },
    /// Create the target if absent, otherwise add `content` after
    /// existing bytes.
    Append { path: String, content: String },
    /// Apply `content` as a unified diff; falls back to a full write of
    /// `content` when the diff cannot be located.
    Patch { path: String, content: String },
}

impl Operation {
    pub fn path(&self) -> &str {
        match self {
            Operation::Write { path, .. }
            | Operation::Append { path, .. }
            | Operation::Patch { path, .. } => path,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Operation::Write { .. } => "write",
            Operation::Append { .. } => "append",
            Operation::Patch { .. } => "patch",
        }
    }
}

/// Per-operation result from the applier.
///
/// A `Failed` operation does not abort the remaining operations in the
/// batch; outcomes are independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum ApplyOutcome {
    Applied,
    /// The patch could not be located and the full replacement content
    /// was written instead. Reported distinctly so it is never mistaken
    /// for a clean patch.
    AppliedViaFallback,
    /// The operation targeted a guarded path (or escaped the base
    /// directory) and no filesystem access occurred.
    SkippedGuarded,
    Failed { reason: String },
}

impl ApplyOutcome {
    /// True when the operation actually mutated the filesystem.
    pub fn applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied | ApplyOutcome::AppliedViaFallback)
    }
}

/// Outcome of one task attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    /// Per-operation results, in the order the gateway returned them.
    pub operations: Vec<(String, ApplyOutcome)>,
    /// Gateway notes or error detail, for the feedback log.
    pub feedback: String,
    /// Branch the changes were committed to (git mode only).
    pub branch: Option<String>,
}

/// Outcome of one branch in the merge loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchOutcome {
    /// The branch merged cleanly into the base branch.
    Merged,
    /// The merge conflicted and was aborted; the tree is clean again.
    ConflictAbort,
    /// The branch was not attempted (e.g. already the base branch).
    Skipped,
}

impl BranchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchOutcome::Merged => "merged",
            BranchOutcome::ConflictAbort => "conflict-abort",
            BranchOutcome::Skipped => "skipped",
        }
    }
}

/// Transient record of a branch processed by the merge loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    pub name: String,
    pub outcome: BranchOutcome,
}
