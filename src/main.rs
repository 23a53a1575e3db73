//! Task-driven LLM automation orchestrator CLI.
//!
//! `autodev run` executes pending tasks from a JSON task list against a
//! model backend; `autodev merge` folds the resulting `task/<id>`
//! branches into the base branch. Exit codes are stable: 0 on full
//! success, 1 when tasks failed, 2 on configuration errors.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};

use autodev::core::report::render_merge_report;
use autodev::io::tasks::reset_tasks;
use autodev::merge::{MergeOptions, run_merge};
use autodev::run::{ConfigError, RunOptions, preflight, run};
use autodev::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "autodev",
    version,
    about = "Task-driven LLM automation orchestrator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute all pending tasks from the task file.
    Run {
        /// Task file (relative paths resolve under the project root).
        #[arg(long, default_value = "tasks.json")]
        tasks: PathBuf,
        /// Project root the operations are applied under.
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Parallel workers (overrides the configured count).
        #[arg(long)]
        workers: Option<usize>,
        /// Commit each task's changes to a `task/<id>` branch.
        #[arg(long)]
        git: bool,
        /// Skip the gateway connectivity check.
        #[arg(long)]
        skip_preflight: bool,
    },
    /// Merge task branches into the base branch, skipping conflicts.
    Merge {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// Base branch (overrides config and detection).
        #[arg(long)]
        base: Option<String>,
        /// Skip the best-effort push of the base branch to origin.
        #[arg(long)]
        no_push: bool,
    },
    /// Reset every task to pending.
    Reset {
        /// Task file (relative paths resolve under the project root).
        #[arg(long, default_value = "tasks.json")]
        tasks: PathBuf,
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Check credential, config, and gateway reachability.
    Preflight {
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

fn main() {
    logging::init();
    match try_main() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            let code = if err.downcast_ref::<ConfigError>().is_some() {
                exit_codes::CONFIG
            } else {
                exit_codes::TASKS_FAILED
            };
            process::exit(code);
        }
    }
}

fn try_main() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            tasks,
            project,
            workers,
            git,
            skip_preflight,
        } => {
            let report = run(&RunOptions {
                project_root: project,
                tasks_file: tasks,
                workers,
                use_git: git,
                skip_preflight,
            })?;
            print!("{}", report.render());
            Ok(if report.all_done() {
                exit_codes::OK
            } else {
                exit_codes::TASKS_FAILED
            })
        }
        Command::Merge {
            project,
            base,
            no_push,
        } => {
            let summary = run_merge(&MergeOptions {
                project_root: project,
                base,
                push: !no_push,
            })?;
            print!("{}", render_merge_report(&summary.base, &summary.records));
            Ok(exit_codes::OK)
        }
        Command::Reset { tasks, project } => {
            let path = if tasks.is_absolute() {
                tasks
            } else {
                project.join(tasks)
            };
            let changed = reset_tasks(&path)?;
            println!("{changed} tasks reset to pending");
            Ok(exit_codes::OK)
        }
        Command::Preflight { project } => {
            preflight(&project)?;
            println!("preflight ok");
            Ok(exit_codes::OK)
        }
    }
}
