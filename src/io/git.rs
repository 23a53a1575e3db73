//! Git adapter for the orchestrator.
//!
//! Every version-control effect goes through this narrow wrapper around
//! `git` subprocess calls, so the merge loop and the per-task commit flow
//! stay testable against ordinary repositories.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Result of attempting one branch merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAttempt {
    Merged,
    /// The merge exited non-zero (conflict or otherwise); the caller must
    /// abort it to restore a clean tree.
    Conflicted { detail: String },
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when the working directory is inside a git repository.
    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--git-dir"])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Detect the base branch: `main`, then `master`, else the current
    /// branch.
    pub fn default_branch(&self) -> Result<String> {
        for candidate in ["main", "master"] {
            if self.branch_exists(candidate)? {
                return Ok(candidate.to_string());
            }
        }
        self.current_branch()
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// List all local branch names.
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["for-each-ref", "--format=%(refname:short)", "refs/heads/"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Checkout the branch, creating it at HEAD when it does not exist.
    pub fn checkout_or_create(&self, branch: &str) -> Result<()> {
        if self.branch_exists(branch)? {
            self.checkout(branch)
        } else {
            debug!(branch, "creating and checking out new branch");
            self.run_checked(&["checkout", "-b", branch])?;
            Ok(())
        }
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Stage specific paths only. Run artifacts (logs, archives, the
    /// task file) must never ride along on a task branch.
    pub fn add_paths(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.run_checked(&args)?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Attempt a no-prompt merge of `branch` into the current branch.
    ///
    /// A non-zero exit is reported as [`MergeAttempt::Conflicted`], never
    /// as an error; the process-level failure modes (git missing, bad
    /// workdir) still error.
    #[instrument(skip_all, fields(branch))]
    pub fn merge(&self, branch: &str, message: &str) -> Result<MergeAttempt> {
        let output = self.run(&["merge", "--no-ff", "--no-edit", branch, "-m", message])?;
        if output.status.success() {
            debug!(branch, "merge succeeded");
            return Ok(MergeAttempt::Merged);
        }
        // git splits merge failure detail across stdout and stderr.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = format!("{} {}", stdout.trim(), stderr.trim())
            .trim()
            .to_string();
        warn!(branch, "merge failed");
        Ok(MergeAttempt::Conflicted { detail })
    }

    /// Discard staged and unstaged changes to tracked files, restoring
    /// the worktree to HEAD.
    pub fn reset_hard(&self) -> Result<()> {
        self.run_checked(&["reset", "--hard"])?;
        Ok(())
    }

    /// Abort an in-progress merge, restoring the pre-merge tree.
    pub fn abort_merge(&self) -> Result<()> {
        self.run_checked(&["merge", "--abort"])?;
        Ok(())
    }

    /// Fetch and merge the remote counterpart of the current branch.
    pub fn pull(&self) -> Result<()> {
        self.run_checked(&["pull", "--no-edit"])?;
        Ok(())
    }

    /// Push `branch` to `origin`.
    pub fn push(&self, branch: &str) -> Result<()> {
        self.run_checked(&["push", "origin", branch])?;
        Ok(())
    }

    /// True when the worktree has no pending changes (including untracked).
    pub fn is_clean(&self) -> Result<bool> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        Ok(out.trim().is_empty())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
