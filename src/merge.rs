//! Merge loop: fold `task/<id>` branches into the base branch.
//!
//! Conflicts are expected outcomes, not errors. A conflicting branch is
//! aborted and recorded; the loop always visits every remaining branch
//! and leaves the repository on a clean base branch.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::types::{BranchOutcome, BranchRecord};
use crate::io::git::{Git, MergeAttempt};
use crate::io::run_log::RunLog;
use crate::run::{ConfigError, first_line, load_checked_config};

/// Options for one `merge` invocation.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub project_root: PathBuf,
    /// Base branch override; falls back to config, then detection.
    pub base: Option<String>,
    /// Push the base branch to `origin` after the loop.
    pub push: bool,
}

/// What the merge loop did, for reporting.
#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub base: String,
    pub records: Vec<BranchRecord>,
}

pub fn run_merge(options: &MergeOptions) -> Result<MergeSummary> {
    let cfg = load_checked_config(&options.project_root)?;
    let git = Git::new(&options.project_root);
    if !git.is_repo() {
        return Err(ConfigError::err(format!(
            "{} is not a git repository",
            options.project_root.display()
        )));
    }

    let base = match options
        .base
        .as_deref()
        .or_else(|| (!cfg.base_branch.trim().is_empty()).then_some(cfg.base_branch.as_str()))
    {
        Some(name) => name.to_string(),
        None => git.default_branch()?,
    };
    // A missing base branch is fatal; there is nothing safe to merge into.
    if !git.branch_exists(&base)? {
        return Err(ConfigError::err(format!(
            "base branch '{base}' does not exist"
        )));
    }

    let mut run_log = RunLog::open(&options.project_root.join(&cfg.log_dir), "merge")?;
    git.checkout(&base)?;
    if let Err(err) = git.pull() {
        // No remote (or an unreachable one) must not stop local merging.
        warn!("pull failed: {err:#}");
        run_log.line(&format!("pull skipped: {}", first_line(&format!("{err:#}"))))?;
    }

    let mut records = Vec::new();
    for branch in git.list_branches()? {
        if branch == base {
            continue;
        }
        if !branch.starts_with("task/") {
            records.push(BranchRecord {
                name: branch,
                outcome: BranchOutcome::Skipped,
            });
            continue;
        }
        let outcome = match git.merge(&branch, &format!("merge {branch} into {base}"))? {
            MergeAttempt::Merged => {
                info!(branch = %branch, "merged");
                run_log.line(&format!("merged {branch}"))?;
                BranchOutcome::Merged
            }
            MergeAttempt::Conflicted { detail } => {
                git.abort_merge()?;
                if !git.is_clean().unwrap_or(true) {
                    warn!(branch = %branch, "worktree not clean after merge abort");
                }
                warn!(branch = %branch, "merge conflict, aborted");
                run_log.line(&format!("conflict on {branch}, aborted: {}", first_line(&detail)))?;
                BranchOutcome::ConflictAbort
            }
        };
        records.push(BranchRecord {
            name: branch,
            outcome,
        });
    }

    if options.push {
        if let Err(err) = git.push(&base) {
            warn!("push failed: {err:#}");
            run_log.line(&format!("push skipped: {}", first_line(&format!("{err:#}"))))?;
        }
    }

    let merged = records
        .iter()
        .filter(|r| r.outcome == BranchOutcome::Merged)
        .count();
    run_log.line(&format!("{merged} of {} branches merged", records.len()))?;
    Ok(MergeSummary { base, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use std::fs;

    fn options(repo: &TestRepo) -> MergeOptions {
        MergeOptions {
            project_root: repo.root().to_path_buf(),
            base: None,
            push: false,
        }
    }

    #[test]
    fn merges_disjoint_branches_and_aborts_conflicts() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        let base = git.current_branch().expect("branch");

        repo.commit_on_branch("task/t-1", "one.txt", "one\n").expect("t-1");
        git.checkout(&base).expect("base");
        repo.commit_on_branch("task/t-2", "two.txt", "two\n").expect("t-2");
        git.checkout(&base).expect("base");
        // t-3 rewrites a file that also changes on the base branch.
        repo.commit_on_branch("task/t-3", "shared.txt", "branch version\n")
            .expect("t-3");
        git.checkout(&base).expect("base");
        repo.commit_file("shared.txt", "base version\n").expect("base edit");

        let summary = run_merge(&options(&repo)).expect("merge");
        assert_eq!(summary.base, base);

        let by_name = |name: &str| {
            summary
                .records
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.outcome)
        };
        assert_eq!(by_name("task/t-1"), Some(BranchOutcome::Merged));
        assert_eq!(by_name("task/t-2"), Some(BranchOutcome::Merged));
        assert_eq!(by_name("task/t-3"), Some(BranchOutcome::ConflictAbort));

        // Merged changes landed; the conflicting branch left no trace.
        assert!(repo.root().join("one.txt").is_file());
        assert!(repo.root().join("two.txt").is_file());
        let shared = fs::read_to_string(repo.root().join("shared.txt")).expect("read");
        assert_eq!(shared, "base version\n");
        assert_eq!(git.current_branch().expect("branch"), base);
    }

    #[test]
    fn non_task_branches_are_skipped() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        let base = git.current_branch().expect("branch");
        repo.commit_on_branch("experiment", "x.txt", "x\n").expect("branch");
        git.checkout(&base).expect("base");

        let summary = run_merge(&options(&repo)).expect("merge");
        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.records[0].outcome, BranchOutcome::Skipped);
        assert!(!repo.root().join("x.txt").exists());
    }

    #[test]
    fn push_without_a_remote_is_logged_and_non_fatal() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.root());
        let base = git.current_branch().expect("branch");
        repo.commit_on_branch("task/t-1", "one.txt", "one\n").expect("t-1");
        git.checkout(&base).expect("base");

        let mut opts = options(&repo);
        opts.push = true;
        let summary = run_merge(&opts).expect("merge");
        assert_eq!(summary.records[0].outcome, BranchOutcome::Merged);

        let log = fs::read_to_string(repo.root().join("logs/workflow.log")).expect("read");
        assert!(log.contains("push skipped"));
    }

    #[test]
    fn missing_base_branch_is_a_config_error() {
        let repo = TestRepo::new().expect("repo");
        let mut opts = options(&repo);
        opts.base = Some("release".to_string());
        let err = run_merge(&opts).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn plain_directory_is_a_config_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_merge(&MergeOptions {
            project_root: temp.path().to_path_buf(),
            base: None,
            push: false,
        })
        .unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
