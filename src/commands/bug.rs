//! Bug commands: reporting with a linked fix task, closing, metrics.

use chrono::Utc;
use serde::Serialize;

use super::{json, Context, Output, RecordResult, RecordView};
use crate::storage::linkage::BugMetrics;
use crate::storage::BugDraft;
use crate::Result;

/// A reported bug and its fix task.
#[derive(Serialize)]
pub struct BugCreatedResult {
    pub bug: RecordView,
    pub fix_task: Option<RecordView>,
}

impl Output for BugCreatedResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Created bug {}: {}", self.bug.id, self.bug.title);
        if let Some(task) = &self.fix_task {
            out.push_str(&format!(
                "\nCreated fix task {}: {} ({})",
                task.id, task.title, task.priority
            ));
        }
        out
    }
}

/// Report a bug.
pub fn bug_create(ctx: &Context, draft: BugDraft) -> Result<BugCreatedResult> {
    let created = ctx.open_store()?.create_bug(draft)?;
    Ok(BugCreatedResult {
        bug: RecordView::new(&created.bug, false),
        fix_task: created.fix_task.as_ref().map(|t| RecordView::new(t, false)),
    })
}

/// Close a bug without a fix.
pub fn bug_close(ctx: &Context, id: &str, reason: &str) -> Result<RecordResult> {
    let bug = ctx.open_store()?.close_bug(id, reason)?;
    Ok(RecordResult::new("Closed", &bug, false))
}

#[derive(Serialize)]
pub struct MetricsResult {
    #[serde(flatten)]
    pub metrics: BugMetrics,
}

impl Output for MetricsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let m = &self.metrics;
        let mut lines = vec![format!(
            "{} bugs, {} open, {} overdue",
            m.total, m.open, m.overdue
        )];
        lines.push(format!(
            "  {:<9} {:>5} {:>6} {:>12} {:>7} {:>8}",
            "severity", "open", "fixed", "without fix", "failed", "overdue"
        ));
        for row in &m.by_severity {
            lines.push(format!(
                "  {:<9} {:>5} {:>6} {:>12} {:>7} {:>8}",
                row.severity.as_str(),
                row.open,
                row.fixed,
                row.closed_without_fix,
                row.failed,
                row.overdue
            ));
        }
        lines.join("\n")
    }
}

/// Per-severity bug counts as of now.
pub fn bug_metrics(ctx: &Context) -> Result<MetricsResult> {
    let metrics = ctx.open_store()?.bug_metrics(Utc::now())?;
    Ok(MetricsResult { metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedConfig;
    use crate::models::{BugSource, Priority, Severity};
    use crate::test_utils::TestEnv;

    #[test]
    fn test_bug_create_and_close() {
        let env = TestEnv::new();
        env.init_store();
        let ctx = Context::new(env.path(), ResolvedConfig::default());

        let created = bug_create(
            &ctx,
            BugDraft::new("Login fails", Severity::High, BugSource::UserReported),
        )
        .unwrap();
        let fix = created.fix_task.as_ref().unwrap();
        assert_eq!(fix.priority, Priority::High);
        assert_eq!(fix.bug_reference.as_deref(), Some(created.bug.id.as_str()));
        assert!(created.to_human().contains("Created fix task"));

        let closed = bug_close(&ctx, &created.bug.id, "duplicate of upstream issue").unwrap();
        assert_eq!(closed.record.closed_as, Some("without_fix"));

        let metrics = bug_metrics(&ctx).unwrap();
        assert_eq!(metrics.metrics.total, 1);
        assert!(metrics.to_human().starts_with("1 bugs, 0 open"));
    }
}
