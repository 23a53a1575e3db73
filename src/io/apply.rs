//! Guarded file-operation applier.
//!
//! Applies gateway operations to the project tree, enforcing two
//! preconditions before any filesystem access: the resolved target must
//! stay inside the base directory, and it must not touch a guarded path.
//! Violations skip the single operation; the rest of the batch proceeds.

use std::fs;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::patch::{PatchResult, apply_patch};
use crate::core::types::{ApplyOutcome, Operation};

/// Protected path prefixes, relative to the base directory.
///
/// Matching is lexical on normalized components; no canonicalization is
/// performed because targets may not exist yet.
#[derive(Debug, Clone, Default)]
pub struct GuardSet {
    prefixes: Vec<PathBuf>,
}

impl GuardSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = patterns
            .into_iter()
            .filter_map(|p| normalize_rel(p.as_ref()))
            .collect();
        Self { prefixes }
    }

    /// True when `rel` (already normalized) equals or is contained in a
    /// guarded path.
    pub fn blocks(&self, rel: &Path) -> bool {
        self.prefixes.iter().any(|guard| rel.starts_with(guard))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Apply an ordered batch of operations under `base_dir`.
///
/// Returns one outcome per operation, in order. A failed operation never
/// aborts its siblings.
pub fn apply_operations(
    base_dir: &Path,
    guards: &GuardSet,
    operations: &[Operation],
) -> Vec<ApplyOutcome> {
    operations
        .iter()
        .map(|op| apply_one(base_dir, guards, op))
        .collect()
}

fn apply_one(base_dir: &Path, guards: &GuardSet, op: &Operation) -> ApplyOutcome {
    let Some(rel) = normalize_rel(op.path()) else {
        warn!(path = op.path(), "refusing path outside base directory");
        return ApplyOutcome::SkippedGuarded;
    };
    if guards.blocks(&rel) {
        warn!(path = op.path(), "refusing guarded path");
        return ApplyOutcome::SkippedGuarded;
    }
    let target = base_dir.join(&rel);

    let result = match op {
        Operation::Write { content, .. } => write_file(&target, content).map(|()| {
            debug!(path = op.path(), bytes = content.len(), "write applied");
            ApplyOutcome::Applied
        }),
        Operation::Append { content, .. } => append_file(&target, content).map(|()| {
            debug!(path = op.path(), bytes = content.len(), "append applied");
            ApplyOutcome::Applied
        }),
        Operation::Patch { content, .. } => patch_file(&target, op.path(), content),
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => ApplyOutcome::Failed {
            reason: format!("{err:#}"),
        },
    }
}

fn patch_file(target: &Path, rel: &str, content: &str) -> Result<ApplyOutcome> {
    let existing = match fs::read_to_string(target) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("read patch target {}", target.display()));
        }
    };

    match existing.as_deref().map(|old| apply_patch(old, content)) {
        Some(PatchResult::Patched(patched)) => {
            write_file(target, &patched)?;
            debug!(path = rel, "patch applied");
            Ok(ApplyOutcome::Applied)
        }
        // Missing target or unlocatable diff: degrade to a full write of
        // the supplied content rather than failing the task.
        Some(PatchResult::ContextMismatch) | None => {
            warn!(path = rel, "patch context not found, writing full content");
            write_file(target, content)?;
            Ok(ApplyOutcome::AppliedViaFallback)
        }
    }
}

fn write_file(target: &Path, content: &str) -> Result<()> {
    create_parent(target)?;
    fs::write(target, content).with_context(|| format!("write {}", target.display()))
}

fn append_file(target: &Path, content: &str) -> Result<()> {
    create_parent(target)?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(target)
        .with_context(|| format!("open {} for append", target.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("append to {}", target.display()))
}

fn create_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Normalize a gateway-supplied path to a safe relative path.
///
/// Returns `None` for absolute paths and any path whose `..` components
/// would escape the base directory.
fn normalize_rel(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        return None;
    }
    Some(out)
}
