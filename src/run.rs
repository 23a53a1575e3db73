//! Run orchestration: load tasks, execute them, persist outcomes.
//!
//! Precondition failures (missing credential, bad config, missing task
//! file) surface as [`ConfigError`] before anything is mutated, so the
//! CLI can exit with a distinct code and zero side effects.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::core::report::RunReport;
use crate::core::types::{ApplyOutcome, Task, TaskOutcome, TaskStatus};
use crate::io::apply::GuardSet;
use crate::io::archive::archive_outcome;
use crate::io::config::{OrchestratorConfig, load_config};
use crate::io::gateway::ModelGateway;
use crate::io::git::Git;
use crate::io::openai::OpenAiGateway;
use crate::io::run_log::{RunLog, timestamp, write_feedback};
use crate::io::tasks::{load_tasks, save_tasks};
use crate::runner::{GitFlow, TaskContext, run_task};

pub const CONFIG_FILE: &str = "autodev.toml";

/// Configuration or precondition failure. Guaranteed zero side effects.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn err(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self(msg.into()))
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Options for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project_root: PathBuf,
    /// Task file path; relative paths resolve under the project root.
    pub tasks_file: PathBuf,
    /// Overrides the configured worker count when set.
    pub workers: Option<usize>,
    /// Commit each task's changes to a `task/<id>` branch.
    pub use_git: bool,
    pub skip_preflight: bool,
}

/// Execute all pending tasks against the configured model backend.
pub fn run(options: &RunOptions) -> Result<RunReport> {
    let api_key = require_api_key()?;
    let cfg = load_checked_config(&options.project_root)?;
    let gateway = OpenAiGateway::new(&cfg.gateway, api_key)?;
    if !options.skip_preflight {
        gateway
            .preflight()
            .map_err(|err| ConfigError::err(format!("gateway preflight failed: {err:#}")))?;
    }
    run_with_gateway(options, &gateway)
}

/// Verify credential, config, and gateway reachability without running
/// any task.
pub fn preflight(project_root: &Path) -> Result<()> {
    let api_key = require_api_key()?;
    let cfg = load_checked_config(project_root)?;
    let gateway = OpenAiGateway::new(&cfg.gateway, api_key)?;
    gateway.preflight()
}

/// Like [`run`], with an injected gateway. The entry point for tests.
pub fn run_with_gateway(
    options: &RunOptions,
    gateway: &(dyn ModelGateway + Sync),
) -> Result<RunReport> {
    let cfg = load_checked_config(&options.project_root)?;
    let tasks_path = resolve_under(&options.project_root, &options.tasks_file);
    if !tasks_path.is_file() {
        return Err(ConfigError::err(format!(
            "task file {} not found",
            tasks_path.display()
        )));
    }
    let mut tasks =
        load_tasks(&tasks_path).map_err(|err| ConfigError::err(format!("{err:#}")))?;

    // The task file is always guarded, wherever it lives in the tree.
    let mut guard_paths = cfg.guard.paths.clone();
    if let Ok(rel) = tasks_path.strip_prefix(&options.project_root) {
        guard_paths.push(rel.to_string_lossy().into_owned());
    }
    let guards = GuardSet::new(&guard_paths);

    let git_parts = if options.use_git {
        let git = Git::new(&options.project_root);
        if !git.is_repo() {
            return Err(ConfigError::err("--git requires a git repository"));
        }
        let base = if cfg.base_branch.trim().is_empty() {
            git.default_branch()?
        } else {
            cfg.base_branch.clone()
        };
        if !git.is_clean().unwrap_or(true) {
            warn!("working tree has pending changes before the run");
        }
        Some((git, base))
    } else {
        None
    };

    let pending: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| task.status == TaskStatus::Pending)
        .map(|(idx, _)| idx)
        .collect();

    let log_dir = options.project_root.join(&cfg.log_dir);
    let archive_dir = options.project_root.join(&cfg.archive_dir);
    let mut run_log = RunLog::open(&log_dir, "run")?;

    if pending.is_empty() {
        run_log.line("no pending tasks")?;
        info!("no pending tasks");
        return Ok(RunReport::default());
    }

    let lock = Mutex::new(());
    let ctx = TaskContext {
        project_root: &options.project_root,
        guards: &guards,
        gateway,
        git: git_parts.as_ref().map(|(git, base)| GitFlow {
            git,
            base_branch: base,
            lock: &lock,
        }),
    };

    let workers = options
        .workers
        .unwrap_or(cfg.workers)
        .clamp(1, pending.len());
    let pending_tasks: Vec<(usize, Task)> =
        pending.iter().map(|&idx| (idx, tasks[idx].clone())).collect();
    info!(tasks = pending_tasks.len(), workers, "starting run");
    run_log.line(&format!(
        "{} pending tasks, {workers} workers",
        pending_tasks.len()
    ))?;

    let mut outcomes = if workers == 1 {
        run_sequential(&ctx, &pending_tasks)
    } else {
        run_parallel(&ctx, &pending_tasks, workers)?
    };
    outcomes.sort_by_key(|(idx, _)| *idx);

    let mut report = RunReport::default();
    for (idx, outcome) in outcomes {
        write_feedback(&log_dir, &outcome.id, &outcome.feedback)?;
        archive_outcome(&archive_dir, &tasks[idx], &outcome)?;

        let task = &mut tasks[idx];
        task.status = outcome.status;
        task.branch = outcome.branch.clone();
        task.completed_at = (outcome.status == TaskStatus::Done).then(timestamp);

        // Operation-level events belong in the invocation log, not just
        // the per-task feedback file.
        for (path, op_outcome) in &outcome.operations {
            match op_outcome {
                ApplyOutcome::Applied => {}
                ApplyOutcome::AppliedViaFallback => {
                    run_log.line(&format!("task {}: patch fallback on {path}", outcome.id))?;
                }
                ApplyOutcome::SkippedGuarded => {
                    run_log.line(&format!("task {}: skipped guarded path {path}", outcome.id))?;
                }
                ApplyOutcome::Failed { reason } => {
                    run_log.line(&format!(
                        "task {}: operation failed on {path}: {}",
                        outcome.id,
                        first_line(reason)
                    ))?;
                }
            }
        }
        run_log.line(&format!(
            "task {}: {}",
            outcome.id,
            if outcome.status == TaskStatus::Done { "done" } else { "failed" }
        ))?;
        report.tasks.push(outcome);
    }
    save_tasks(&tasks_path, &tasks)?;
    run_log.line(&format!(
        "{} done, {} failed",
        report.done_count(),
        report.failed_count()
    ))?;
    Ok(report)
}

/// One worker: tasks run in file order, each seeing notes from earlier
/// resolved tasks.
fn run_sequential(ctx: &TaskContext<'_>, pending: &[(usize, Task)]) -> Vec<(usize, TaskOutcome)> {
    let mut notes: Vec<String> = Vec::new();
    let mut outcomes = Vec::with_capacity(pending.len());
    for (idx, task) in pending {
        let prior = (!notes.is_empty()).then(|| notes.join("\n"));
        let outcome = run_task(ctx, task, prior.as_deref());
        if outcome.status == TaskStatus::Done {
            notes.push(format!("{}: {}", task.id, first_line(&outcome.feedback)));
        }
        outcomes.push((*idx, outcome));
    }
    outcomes
}

/// Scoped worker pool over a disjoint round-robin partition of the
/// pending tasks. Workers share no mutable state; git effects are
/// serialized by the flow lock inside the context.
fn run_parallel(
    ctx: &TaskContext<'_>,
    pending: &[(usize, Task)],
    workers: usize,
) -> Result<Vec<(usize, TaskOutcome)>> {
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let slice: Vec<&(usize, Task)> =
                pending.iter().skip(worker).step_by(workers).collect();
            handles.push(scope.spawn(move || {
                slice
                    .into_iter()
                    .map(|(idx, task)| (*idx, run_task(ctx, task, None)))
                    .collect::<Vec<_>>()
            }));
        }
        let mut all = Vec::with_capacity(pending.len());
        for handle in handles {
            all.extend(
                handle
                    .join()
                    .map_err(|_| anyhow!("worker thread panicked"))?,
            );
        }
        Ok(all)
    })
}

fn require_api_key() -> Result<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::err("OPENAI_API_KEY is not set")),
    }
}

pub(crate) fn load_checked_config(project_root: &Path) -> Result<OrchestratorConfig> {
    if !project_root.is_dir() {
        return Err(ConfigError::err(format!(
            "project root {} is not a directory",
            project_root.display()
        )));
    }
    load_config(&project_root.join(CONFIG_FILE))
        .map_err(|err| ConfigError::err(format!("{err:#}")))
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

pub(crate) fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}
