//! Task file loading and persistence.
//!
//! The on-disk file is either a bare JSON array of tasks or an object
//! wrapping one under a `tasks` field. The ambiguity stops at the loader:
//! everything past this module works with an ordered `Vec<Task>`, and
//! saves always write the bare-array form.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::debug;

use crate::core::types::Task;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskFile {
    Bare(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

/// Load and normalize the task file.
///
/// Fails on a missing file, malformed JSON, or duplicate task ids.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read task file {}", path.display()))?;
    let file: TaskFile = serde_json::from_str(&contents)
        .with_context(|| format!("parse task file {}", path.display()))?;
    let tasks = match file {
        TaskFile::Bare(tasks) | TaskFile::Wrapped { tasks } => tasks,
    };
    check_unique_ids(&tasks)?;
    debug!(count = tasks.len(), "tasks loaded");
    Ok(tasks)
}

/// Atomically write tasks back to disk (temp file + rename).
pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(tasks).context("serialize tasks")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("task path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp task file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace task file {}", path.display()))?;
    Ok(())
}

/// Reset every task to pending, clearing completion metadata.
///
/// Returns the number of tasks whose state changed.
pub fn reset_tasks(path: &Path) -> Result<usize> {
    let mut tasks = load_tasks(path)?;
    let mut changed = 0;
    for task in &mut tasks {
        if task.status != crate::core::types::TaskStatus::Pending
            || task.completed_at.is_some()
            || task.branch.is_some()
        {
            changed += 1;
        }
        task.status = crate::core::types::TaskStatus::Pending;
        task.completed_at = None;
        task.branch = None;
    }
    save_tasks(path, &tasks)?;
    debug!(changed, "tasks reset to pending");
    Ok(changed)
}

fn check_unique_ids(tasks: &[Task]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(anyhow!("duplicate task id '{}'", task.id));
        }
        if task.id.trim().is_empty() {
            return Err(anyhow!("task id must not be empty"));
        }
    }
    Ok(())
}
