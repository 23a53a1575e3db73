//! Pure unified-diff application.
//!
//! The gateway may return a patch as a unified diff or as a full
//! replacement body. This module only answers one question: can the diff
//! be located in the current content? Anything else (missing hunk
//! headers, context mismatch) is reported as [`PatchResult::ContextMismatch`]
//! and the applier degrades to a full write of the supplied content.

/// Result of attempting to apply a patch to existing content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchResult {
    /// The diff applied cleanly; the new content is returned.
    Patched(String),
    /// The patch is not a locatable diff against the given content.
    ContextMismatch,
}

#[derive(Debug)]
struct Hunk {
    /// 1-based line number on the old side, as declared in the header.
    old_start: usize,
    /// Lines the old side must contain (context + removals).
    old_lines: Vec<String>,
    /// Lines the new side produces (context + additions).
    new_lines: Vec<String>,
}

/// Attempt to apply `patch` (a unified diff) to `original`.
///
/// Hunks are matched first at their declared position, then by searching
/// forward from the previous hunk. Any hunk that cannot be located makes
/// the whole patch a mismatch; partial application is never produced.
pub fn apply_patch(original: &str, patch: &str) -> PatchResult {
    let hunks = match parse_hunks(patch) {
        Some(hunks) if !hunks.is_empty() => hunks,
        _ => return PatchResult::ContextMismatch,
    };

    let old: Vec<&str> = original.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(old.len());
    // Index into `old` of the next unconsumed line.
    let mut cursor = 0usize;

    for hunk in &hunks {
        let declared = hunk.old_start.saturating_sub(1);
        let found = if declared >= cursor && matches_at(&old, declared, &hunk.old_lines) {
            declared
        } else {
            match search_from(&old, cursor, &hunk.old_lines) {
                Some(pos) => pos,
                None => return PatchResult::ContextMismatch,
            }
        };

        for line in &old[cursor..found] {
            out.push((*line).to_string());
        }
        out.extend(hunk.new_lines.iter().cloned());
        cursor = found + hunk.old_lines.len();
    }

    for line in &old[cursor..] {
        out.push((*line).to_string());
    }

    let mut patched = out.join("\n");
    if original.ends_with('\n') || original.is_empty() {
        patched.push('\n');
    }
    PatchResult::Patched(patched)
}

fn matches_at(old: &[&str], pos: usize, wanted: &[String]) -> bool {
    if pos + wanted.len() > old.len() {
        return false;
    }
    wanted.iter().zip(&old[pos..]).all(|(w, o)| w == o)
}

fn search_from(old: &[&str], from: usize, wanted: &[String]) -> Option<usize> {
    // An empty old side (pure insertion hunk) anchors at the cursor.
    if wanted.is_empty() {
        return Some(from);
    }
    (from..=old.len().saturating_sub(wanted.len()))
        .find(|&pos| matches_at(old, pos, wanted))
}

/// Parse the hunks of a unified diff. Returns `None` when the text does
/// not contain any well-formed `@@` header.
fn parse_hunks(patch: &str) -> Option<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in patch.lines() {
        if line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with("diff ") {
            continue;
        }
        if line.starts_with("@@") {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            current = Some(Hunk {
                old_start: parse_old_start(line)?,
                old_lines: Vec::new(),
                new_lines: Vec::new(),
            });
            continue;
        }
        let Some(hunk) = current.as_mut() else {
            // Body text before the first header: not a diff.
            if line.trim().is_empty() {
                continue;
            }
            return None;
        };
        match line.chars().next() {
            Some(' ') => {
                hunk.old_lines.push(line[1..].to_string());
                hunk.new_lines.push(line[1..].to_string());
            }
            Some('-') => hunk.old_lines.push(line[1..].to_string()),
            Some('+') => hunk.new_lines.push(line[1..].to_string()),
            // "\ No newline at end of file" markers and blank separators.
            Some('\\') | None => {}
            _ => return None,
        }
    }
    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }
    Some(hunks)
}

/// Extract the old-side start line from a `@@ -l[,n] +l[,n] @@` header.
fn parse_old_start(header: &str) -> Option<usize> {
    let rest = header.trim_start_matches('@').trim_start();
    let old = rest.strip_prefix('-')?;
    let end = old
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(old.len());
    old[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "fn main() {\n    println!(\"one\");\n    println!(\"two\");\n}\n";

    #[test]
    fn applies_simple_hunk() {
        let patch = "@@ -2,1 +2,1 @@\n-    println!(\"one\");\n+    println!(\"uno\");\n";
        let result = apply_patch(ORIGINAL, patch);
        assert_eq!(
            result,
            PatchResult::Patched(
                "fn main() {\n    println!(\"uno\");\n    println!(\"two\");\n}\n".to_string()
            )
        );
    }

    #[test]
    fn applies_hunk_with_context() {
        let patch = "@@ -1,3 +1,4 @@\n fn main() {\n     println!(\"one\");\n+    println!(\"mid\");\n     println!(\"two\");\n";
        match apply_patch(ORIGINAL, patch) {
            PatchResult::Patched(out) => {
                assert!(out.contains("mid"));
                assert!(out.contains("one"));
            }
            PatchResult::ContextMismatch => panic!("expected clean apply"),
        }
    }

    #[test]
    fn relocates_hunk_with_stale_line_numbers() {
        // Declared at line 90 but the content sits at line 2.
        let patch = "@@ -90,1 +90,1 @@\n-    println!(\"two\");\n+    println!(\"dos\");\n";
        match apply_patch(ORIGINAL, patch) {
            PatchResult::Patched(out) => assert!(out.contains("dos")),
            PatchResult::ContextMismatch => panic!("expected relocation"),
        }
    }

    #[test]
    fn mismatched_context_is_reported() {
        let patch = "@@ -2,1 +2,1 @@\n-    println!(\"three\");\n+    println!(\"tres\");\n";
        assert_eq!(apply_patch(ORIGINAL, patch), PatchResult::ContextMismatch);
    }

    #[test]
    fn plain_replacement_text_is_a_mismatch() {
        let replacement = "fn main() {}\n";
        assert_eq!(
            apply_patch(ORIGINAL, replacement),
            PatchResult::ContextMismatch
        );
    }

    #[test]
    fn file_header_lines_are_ignored() {
        let patch = "--- a/main.rs\n+++ b/main.rs\n@@ -2,1 +2,1 @@\n-    println!(\"one\");\n+    println!(\"1\");\n";
        assert!(matches!(
            apply_patch(ORIGINAL, patch),
            PatchResult::Patched(_)
        ));
    }

    #[test]
    fn hunks_never_partially_apply() {
        let patch = "@@ -1,1 +1,1 @@\n-fn main() {\n+fn start() {\n@@ -9,1 +9,1 @@\n-missing\n+found\n";
        assert_eq!(apply_patch(ORIGINAL, patch), PatchResult::ContextMismatch);
    }
}
