//! Single-task execution: gateway call, guarded apply, optional commit.
//!
//! Every failure mode of one task is contained here as a `Failed`
//! [`TaskOutcome`]; the caller decides run-level consequences. A task is
//! done only when at least one operation actually changed the tree.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::{ApplyOutcome, Task, TaskOutcome, TaskStatus};
use crate::io::apply::{GuardSet, apply_operations};
use crate::io::gateway::{GatewayRequest, GatewayResponse, ModelGateway};
use crate::io::git::Git;

/// Per-task git flow: branch off the base, commit, return to base.
///
/// The lock serializes every git mutation across workers; the working
/// tree is shared, so apply and commit must happen under it as one unit.
pub struct GitFlow<'a> {
    pub git: &'a Git,
    pub base_branch: &'a str,
    pub lock: &'a Mutex<()>,
}

/// Shared, read-only context for executing tasks.
pub struct TaskContext<'a> {
    pub project_root: &'a Path,
    pub guards: &'a GuardSet,
    pub gateway: &'a (dyn ModelGateway + Sync),
    pub git: Option<GitFlow<'a>>,
}

/// Execute one pending task end to end.
#[instrument(skip_all, fields(task_id = %task.id))]
pub fn run_task(ctx: &TaskContext<'_>, task: &Task, prior_context: Option<&str>) -> TaskOutcome {
    let request = GatewayRequest {
        task: task.clone(),
        project_root: ctx.project_root.to_path_buf(),
        prior_context: prior_context.map(str::to_string),
    };

    let response = match ctx.gateway.propose(&request) {
        Ok(response) => response,
        Err(err) => {
            warn!(task_id = %task.id, "gateway call failed");
            return failed(task, format!("gateway error: {err:#}"));
        }
    };
    if response.operations.is_empty() {
        return failed(task, "gateway returned no operations".to_string());
    }

    match &ctx.git {
        Some(flow) => run_on_branch(ctx, flow, task, &response),
        None => finish(task, &response, apply_now(ctx, &response), None),
    }
}

fn apply_now(ctx: &TaskContext<'_>, response: &GatewayResponse) -> Vec<ApplyOutcome> {
    apply_operations(ctx.project_root, ctx.guards, &response.operations)
}

/// Apply and commit on `task/<id>` while holding the git lock.
fn run_on_branch(
    ctx: &TaskContext<'_>,
    flow: &GitFlow<'_>,
    task: &Task,
    response: &GatewayResponse,
) -> TaskOutcome {
    let _guard = flow.lock.lock().unwrap_or_else(PoisonError::into_inner);
    let branch = format!("task/{}", task.id);

    let applied = match prepare_branch(flow, &branch).map(|()| apply_now(ctx, response)) {
        Ok(applied) => applied,
        Err(err) => {
            restore_base(flow);
            return failed(task, format!("git error: {err:#}"));
        }
    };

    // Stage only paths the applier actually touched; run artifacts stay
    // out of the task branch.
    let touched: Vec<&str> = response
        .operations
        .iter()
        .zip(&applied)
        .filter(|(_, outcome)| outcome.applied())
        .map(|(op, _)| op.path())
        .collect();
    let commit = flow
        .git
        .add_paths(&touched)
        .and_then(|()| flow.git.commit_staged(&format!("{}: {}", task.id, task.title)));
    if commit.is_err() {
        // Applied-but-uncommitted edits must not leak into later tasks
        // through the shared worktree.
        if let Err(reset_err) = flow.git.reset_hard() {
            warn!(task_id = %task.id, "could not discard uncommitted changes: {reset_err:#}");
        }
    }
    restore_base(flow);
    match commit {
        Ok(committed) => {
            if committed {
                info!(task_id = %task.id, branch = %branch, "changes committed");
            }
            finish(task, response, applied, committed.then_some(branch))
        }
        Err(err) => failed(task, format!("git error: {err:#}")),
    }
}

fn prepare_branch(flow: &GitFlow<'_>, branch: &str) -> Result<()> {
    flow.git.checkout(flow.base_branch)?;
    flow.git.checkout_or_create(branch)
}

fn restore_base(flow: &GitFlow<'_>) {
    if let Err(err) = flow.git.checkout(flow.base_branch) {
        warn!(base = flow.base_branch, "could not return to base branch: {err:#}");
    }
}

fn finish(
    task: &Task,
    response: &GatewayResponse,
    applied: Vec<ApplyOutcome>,
    branch: Option<String>,
) -> TaskOutcome {
    let operations: Vec<(String, ApplyOutcome)> = response
        .operations
        .iter()
        .map(|op| op.path().to_string())
        .zip(applied)
        .collect();
    let any_applied = operations.iter().any(|(_, outcome)| outcome.applied());

    let mut feedback = String::new();
    if !response.notes.trim().is_empty() {
        feedback.push_str(response.notes.trim());
        feedback.push('\n');
    }
    for (path, outcome) in &operations {
        let label = match outcome {
            ApplyOutcome::Applied => "applied".to_string(),
            ApplyOutcome::AppliedViaFallback => "applied-via-fallback".to_string(),
            ApplyOutcome::SkippedGuarded => "skipped-guarded".to_string(),
            ApplyOutcome::Failed { reason } => format!("failed ({reason})"),
        };
        feedback.push_str(&format!("{label} {path}\n"));
    }
    if !any_applied {
        feedback.push_str("no operation changed the project\n");
    }

    TaskOutcome {
        id: task.id.clone(),
        title: task.title.clone(),
        status: if any_applied {
            TaskStatus::Done
        } else {
            TaskStatus::Failed
        },
        operations,
        feedback,
        branch,
    }
}

fn failed(task: &Task, feedback: String) -> TaskOutcome {
    TaskOutcome {
        id: task.id.clone(),
        title: task.title.clone(),
        status: TaskStatus::Failed,
        operations: Vec::new(),
        feedback,
        branch: None,
    }
}
