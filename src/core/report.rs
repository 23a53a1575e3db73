//! Human-readable end-of-run summaries.

use crate::core::types::{ApplyOutcome, BranchRecord, TaskOutcome, TaskStatus};

/// Aggregated outcome of one runner invocation.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub tasks: Vec<TaskOutcome>,
}

impl RunReport {
    pub fn failed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count()
    }

    pub fn done_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .count()
    }

    /// True when every processed task resolved successfully.
    pub fn all_done(&self) -> bool {
        self.failed_count() == 0
    }

    /// Render one line per task plus a totals line.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        for task in &self.tasks {
            let status = match task.status {
                TaskStatus::Done => "done",
                TaskStatus::Failed => "failed",
                TaskStatus::Pending => "pending",
            };
            buf.push_str(&format!("{}: {} ({})\n", task.id, status, task.title));
            for (path, outcome) in &task.operations {
                buf.push_str(&format!("  {} {}\n", outcome_label(outcome), path));
            }
        }
        buf.push_str(&format!(
            "{} done, {} failed, {} total\n",
            self.done_count(),
            self.failed_count(),
            self.tasks.len()
        ));
        buf
    }
}

fn outcome_label(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Applied => "applied".to_string(),
        ApplyOutcome::AppliedViaFallback => "applied-via-fallback".to_string(),
        ApplyOutcome::SkippedGuarded => "skipped-guarded".to_string(),
        ApplyOutcome::Failed { reason } => format!("failed ({reason})"),
    }
}

/// Render one line per branch processed by the merge loop.
pub fn render_merge_report(base: &str, records: &[BranchRecord]) -> String {
    let mut buf = format!("merge into {base}:\n");
    for record in records {
        buf.push_str(&format!("  {} {}\n", record.outcome.as_str(), record.name));
    }
    let merged = records
        .iter()
        .filter(|r| r.outcome == crate::core::types::BranchOutcome::Merged)
        .count();
    buf.push_str(&format!("{merged} of {} branches merged\n", records.len()));
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BranchOutcome;

    #[test]
    fn report_counts_statuses() {
        let report = RunReport {
            tasks: vec![
                TaskOutcome {
                    id: "t-1".to_string(),
                    title: "a".to_string(),
                    status: TaskStatus::Done,
                    operations: vec![("a.txt".to_string(), ApplyOutcome::Applied)],
                    feedback: String::new(),
                    branch: None,
                },
                TaskOutcome {
                    id: "t-2".to_string(),
                    title: "b".to_string(),
                    status: TaskStatus::Failed,
                    operations: Vec::new(),
                    feedback: "gateway error".to_string(),
                    branch: None,
                },
            ],
        };
        assert_eq!(report.done_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.all_done());

        let rendered = report.render();
        assert!(rendered.contains("t-1: done"));
        assert!(rendered.contains("t-2: failed"));
        assert!(rendered.contains("1 done, 1 failed, 2 total"));
    }

    #[test]
    fn merge_report_lists_every_branch() {
        let rendered = render_merge_report(
            "main",
            &[
                BranchRecord {
                    name: "task/t-1".to_string(),
                    outcome: BranchOutcome::Merged,
                },
                BranchRecord {
                    name: "task/t-2".to_string(),
                    outcome: BranchOutcome::ConflictAbort,
                },
            ],
        );
        assert!(rendered.contains("merged task/t-1"));
        assert!(rendered.contains("conflict-abort task/t-2"));
        assert!(rendered.contains("1 of 2 branches merged"));
    }
}
