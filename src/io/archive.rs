//! JSON archives of completed and failed tasks.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::core::types::{Task, TaskOutcome};
use crate::io::run_log::timestamp;

pub const COMPLETED_FILE: &str = "completed_tasks.json";
pub const FAILED_FILE: &str = "failed_tasks.json";

#[derive(Debug, Serialize)]
struct CompletedRecord<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    branch: Option<&'a str>,
    completed_at: String,
}

#[derive(Debug, Serialize)]
struct FailedRecord<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    error: &'a str,
    failed_at: String,
}

/// Append the task's archive record to the matching archive file.
pub fn archive_outcome(archive_dir: &Path, task: &Task, outcome: &TaskOutcome) -> Result<()> {
    match outcome.status {
        crate::core::types::TaskStatus::Done => append_record(
            &archive_dir.join(COMPLETED_FILE),
            &CompletedRecord {
                id: &task.id,
                title: &task.title,
                description: &task.description,
                branch: outcome.branch.as_deref(),
                completed_at: timestamp(),
            },
        ),
        _ => append_record(
            &archive_dir.join(FAILED_FILE),
            &FailedRecord {
                id: &task.id,
                title: &task.title,
                description: &task.description,
                error: &outcome.feedback,
                failed_at: timestamp(),
            },
        ),
    }
}

/// Append one record to a JSON-array archive file.
///
/// An unreadable or malformed existing archive is replaced rather than
/// blocking the run.
fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create archive directory {}", parent.display()))?;
    }
    let mut entries: Vec<Value> = match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|_| {
            warn!(path = %path.display(), "archive file was malformed, starting fresh");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    };
    entries.push(serde_json::to_value(record).context("serialize archive record")?);

    let mut buf = serde_json::to_string_pretty(&entries).context("serialize archive")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write archive {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Task, TaskStatus};

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: "a title".to_string(),
            description: "a description".to_string(),
            status: TaskStatus::Pending,
            kind: "code".to_string(),
            completed_at: None,
            branch: None,
        }
    }

    fn outcome(id: &str, status: TaskStatus) -> TaskOutcome {
        TaskOutcome {
            id: id.to_string(),
            title: "a title".to_string(),
            status,
            operations: Vec::new(),
            feedback: "detail".to_string(),
            branch: None,
        }
    }

    #[test]
    fn archives_accumulate_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        archive_outcome(temp.path(), &task("t-1"), &outcome("t-1", TaskStatus::Done))
            .expect("archive");
        archive_outcome(temp.path(), &task("t-2"), &outcome("t-2", TaskStatus::Done))
            .expect("archive");

        let raw = fs::read_to_string(temp.path().join(COMPLETED_FILE)).expect("read");
        let entries: Vec<Value> = serde_json::from_str(&raw).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["id"], "t-2");
    }

    #[test]
    fn failed_tasks_go_to_their_own_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        archive_outcome(temp.path(), &task("t-1"), &outcome("t-1", TaskStatus::Failed))
            .expect("archive");

        assert!(!temp.path().join(COMPLETED_FILE).exists());
        let raw = fs::read_to_string(temp.path().join(FAILED_FILE)).expect("read");
        assert!(raw.contains("\"error\": \"detail\""));
    }

    #[test]
    fn malformed_archive_is_replaced() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(COMPLETED_FILE), "not json").expect("seed");
        archive_outcome(temp.path(), &task("t-1"), &outcome("t-1", TaskStatus::Done))
            .expect("archive");
        let raw = fs::read_to_string(temp.path().join(COMPLETED_FILE)).expect("read");
        let entries: Vec<Value> = serde_json::from_str(&raw).expect("parse");
        assert_eq!(entries.len(), 1);
    }
}
