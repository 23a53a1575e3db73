//! Test-only helpers: throwaway git repositories and scripted gateways.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::types::Operation;
use crate::io::gateway::{GatewayRequest, GatewayResponse, ModelGateway};

/// A temporary git repository with one initial commit.
///
/// The directory is removed when the value is dropped.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        repo.commit_file("README.md", "hi\n")?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file and commit it on the current branch.
    pub fn commit_file(&self, file: &str, content: &str) -> Result<()> {
        let path = self.root().join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("create parent")?;
        }
        std::fs::write(&path, content).with_context(|| format!("write {file}"))?;
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-m", &format!("add {file}")])?;
        Ok(())
    }

    /// Create (or reuse) `branch` off the current HEAD and commit a file
    /// there. Leaves the repository on `branch`.
    pub fn commit_on_branch(&self, branch: &str, file: &str, content: &str) -> Result<()> {
        if self.git_ok(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")])? {
            self.git(&["checkout", branch])?;
        } else {
            self.git(&["checkout", "-b", branch])?;
        }
        self.commit_file(file, content)
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        if !self.git_ok(args)? {
            bail!("git {} failed in test repo", args.join(" "));
        }
        Ok(())
    }

    fn git_ok(&self, args: &[&str]) -> Result<bool> {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.root())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        Ok(status.status.success())
    }
}

/// Gateway returning predetermined replies keyed by task id.
///
/// Keying by id (rather than call order) keeps scripted runs
/// deterministic under parallel workers.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<HashMap<String, ScriptedReply>>,
}

enum ScriptedReply {
    Respond(GatewayResponse),
    Fail(String),
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful reply for `task_id`.
    pub fn respond(&self, task_id: &str, operations: Vec<Operation>, notes: &str) {
        self.insert(
            task_id,
            ScriptedReply::Respond(GatewayResponse {
                operations,
                notes: notes.to_string(),
            }),
        );
    }

    /// Script a single write operation for `task_id`.
    pub fn respond_write(&self, task_id: &str, path: &str, content: &str) {
        self.respond(
            task_id,
            vec![Operation::Write {
                path: path.to_string(),
                content: content.to_string(),
            }],
            &format!("wrote {path}"),
        );
    }

    /// Script a gateway failure for `task_id`.
    pub fn fail(&self, task_id: &str, message: &str) {
        self.insert(task_id, ScriptedReply::Fail(message.to_string()));
    }

    fn insert(&self, task_id: &str, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(task_id.to_string(), reply);
    }
}

impl ModelGateway for ScriptedGateway {
    fn propose(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&request.task.id)
            .ok_or_else(|| anyhow!("no scripted reply for task {}", request.task.id))?;
        match reply {
            ScriptedReply::Respond(response) => Ok(response),
            ScriptedReply::Fail(message) => Err(anyhow!(message)),
        }
    }
}
