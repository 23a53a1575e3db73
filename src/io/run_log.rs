//! Append-only run log and per-task feedback files.
//!
//! # Separation of concerns
//!
//! - **Tracing (`logging`)**: dev diagnostics via `RUST_LOG`, stderr only.
//! - **Run log (this module)**: product artifact under `logs/`, always
//!   written, one timestamped header per invocation and one line per
//!   significant step.
//!
//! Feedback goes to a distinct task-id-keyed file per task, so concurrent
//! workers never write the same path.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

pub const RUN_LOG_FILE: &str = "workflow.log";

/// Append-only log for one orchestrator invocation.
#[derive(Debug)]
pub struct RunLog {
    file: fs::File,
    path: PathBuf,
}

impl RunLog {
    /// Open (creating directories as needed) and write the invocation
    /// header.
    pub fn open(log_dir: &Path, label: &str) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("create log directory {}", log_dir.display()))?;
        let path = log_dir.join(RUN_LOG_FILE);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open run log {}", path.display()))?;
        let mut log = Self { file, path };
        log.write_raw(&format!("==== {} {} ====", label, timestamp()))?;
        Ok(log)
    }

    /// Append one step line.
    pub fn line(&mut self, msg: &str) -> Result<()> {
        self.write_raw(msg)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_raw(&mut self, msg: &str) -> Result<()> {
        self.file
            .write_all(format!("{msg}\n").as_bytes())
            .with_context(|| format!("append to {}", self.path.display()))
    }
}

/// Write gateway feedback for one task to `logs/feedback/<task-id>.log`.
pub fn write_feedback(log_dir: &Path, task_id: &str, feedback: &str) -> Result<()> {
    let dir = log_dir.join("feedback");
    fs::create_dir_all(&dir)
        .with_context(|| format!("create feedback directory {}", dir.display()))?;
    let path = dir.join(format!("{task_id}.log"));
    let body = format!("==== {} {} ====\n{}\n", task_id, timestamp(), feedback.trim());
    fs::write(&path, body).with_context(|| format!("write feedback {}", path.display()))
}

/// UTC timestamp in RFC 3339 with second precision.
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_appends_across_invocations() {
        let temp = tempfile::tempdir().expect("tempdir");
        {
            let mut log = RunLog::open(temp.path(), "run").expect("open");
            log.line("task t-1: done").expect("line");
        }
        {
            let mut log = RunLog::open(temp.path(), "merge").expect("open");
            log.line("merged task/t-1").expect("line");
        }

        let contents = fs::read_to_string(temp.path().join(RUN_LOG_FILE)).expect("read");
        let headers = contents.lines().filter(|l| l.starts_with("====")).count();
        assert_eq!(headers, 2);
        assert!(contents.contains("task t-1: done"));
        assert!(contents.contains("merged task/t-1"));
    }

    #[test]
    fn feedback_is_keyed_by_task_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_feedback(temp.path(), "t-1", "edits applied").expect("write");
        write_feedback(temp.path(), "t-2", "gateway error").expect("write");

        let one = fs::read_to_string(temp.path().join("feedback/t-1.log")).expect("read");
        assert!(one.contains("edits applied"));
        let two = fs::read_to_string(temp.path().join("feedback/t-2.log")).expect("read");
        assert!(two.contains("gateway error"));
    }
}
