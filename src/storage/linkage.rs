//! Bug–task linkage.
//!
//! A `bug_fix` task points at its bug through `bug_reference`; the bug
//! never lists its tasks. A bug closes as `fixed` when a linked fix task
//! completes, or manually as `without_fix` with a reason, so the two
//! can be told apart in quality metrics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Area, Store};
use crate::models::{lifecycle, Closure, Collection, Record, RecordKind, Severity, Status};
use crate::{Error, Result};

/// Bug counts for one severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeverityMetrics {
    pub severity: Severity,
    pub open: usize,
    pub fixed: usize,
    pub closed_without_fix: usize,
    pub failed: usize,
    /// Open bugs past their SLA fix window
    pub overdue: usize,
}

impl SeverityMetrics {
    fn new(severity: Severity) -> Self {
        Self {
            severity,
            open: 0,
            fixed: 0,
            closed_without_fix: 0,
            failed: 0,
            overdue: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.open + self.fixed + self.closed_without_fix + self.failed
    }
}

/// Bug quality metrics across active and archived bugs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugMetrics {
    pub by_severity: Vec<SeverityMetrics>,
    pub total: usize,
    pub open: usize,
    pub overdue: usize,
}

impl Store {
    /// Close a bug manually, recording that no fix task completed it.
    pub fn close_bug(&self, id: &str, reason: &str) -> Result<Record> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Validation(
                "a reason is required to close a bug without a fix".to_string(),
            ));
        }
        let (mut bug, area) = self.locate(Collection::Bugs, id)?;
        if area == Area::Archive {
            return Err(Error::Validation(format!("bug {} is archived; restore it first", id)));
        }
        lifecycle::close_bug(
            &mut bug,
            Closure::WithoutFix {
                reason: reason.to_string(),
            },
            Utc::now(),
        )?;
        self.commit(&bug)?;
        tracing::info!(bug = %id, reason = %reason, "closed bug without fix");
        Ok(bug)
    }

    /// Close the bug a completed fix task points at.
    ///
    /// Returns `None` when there is nothing to close: the reference does
    /// not resolve, the bug is archived, or it is already closed.
    pub(crate) fn close_fixed_bug(&self, bug_id: &str, task_id: &str) -> Result<Option<Record>> {
        let (mut bug, area) = match self.locate(Collection::Bugs, bug_id) {
            Ok(found) => found,
            Err(Error::NotFound(_)) => {
                tracing::warn!(bug = %bug_id, task = %task_id, "fix task references a missing bug");
                return Ok(None);
            }
            Err(e) => return Err(self.bug_not_closed(bug_id, task_id, e)),
        };
        if area == Area::Archive || bug.status.is_terminal() {
            tracing::debug!(bug = %bug_id, status = %bug.status, "bug already settled");
            return Ok(None);
        }

        let closure = Closure::Fixed {
            task_id: task_id.to_string(),
        };
        lifecycle::close_bug(&mut bug, closure, Utc::now())
            .map_err(|e| self.bug_not_closed(bug_id, task_id, e))?;
        self.commit(&bug)
            .map_err(|e| self.bug_not_closed(bug_id, task_id, e))?;
        tracing::info!(bug = %bug_id, task = %task_id, "closed bug as fixed");
        Ok(Some(bug))
    }

    /// The task already completed, so any failure past that point is partial.
    fn bug_not_closed(&self, bug_id: &str, task_id: &str, e: Error) -> Error {
        if let Error::PartialFailure { .. } = e {
            return e;
        }
        tracing::warn!(bug = %bug_id, task = %task_id, error = %e, "fix task completed but bug not closed");
        Error::PartialFailure {
            collection: Collection::Bugs,
            ids: vec![bug_id.to_string()],
            detail: format!("task {} completed but the bug was not closed: {}", task_id, e),
            recovery: format!(
                "close it with `wb bug close {} -r \"fixed by {}\"`",
                bug_id, task_id
            ),
        }
    }

    /// Tasks whose `bug_reference` points at this bug, active or archived.
    pub fn fix_tasks_for(&self, bug_id: &str) -> Result<Vec<Record>> {
        self.get(Collection::Bugs, bug_id)?;
        Ok(self
            .records(Collection::Tasks)?
            .into_iter()
            .map(|(task, _)| task)
            .filter(|task| task.bug_reference() == Some(bug_id))
            .collect())
    }

    /// Per-severity bug counts as of `now`.
    pub fn bug_metrics(&self, now: DateTime<Utc>) -> Result<BugMetrics> {
        let mut by_severity: Vec<SeverityMetrics> =
            Severity::all().into_iter().map(SeverityMetrics::new).collect();

        for (bug, _) in self.records(Collection::Bugs)? {
            let RecordKind::Bug {
                severity, closure, ..
            } = &bug.kind
            else {
                continue;
            };
            let Some(row) = by_severity.iter_mut().find(|m| m.severity == *severity) else {
                continue;
            };
            match (bug.status, closure) {
                (Status::Completed, Some(Closure::WithoutFix { .. })) => row.closed_without_fix += 1,
                (Status::Completed, _) => row.fixed += 1,
                (Status::Failed, _) => row.failed += 1,
                _ => {
                    row.open += 1;
                    if bug.is_overdue(now) {
                        row.overdue += 1;
                    }
                }
            }
        }

        Ok(BugMetrics {
            total: by_severity.iter().map(SeverityMetrics::total).sum(),
            open: by_severity.iter().map(|m| m.open).sum(),
            overdue: by_severity.iter().map(|m| m.overdue).sum(),
            by_severity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BugSource;
    use crate::storage::{BugDraft, TaskDraft};
    use crate::test_utils::TestEnv;
    use chrono::Duration;

    fn make_bug(store: &Store, title: &str, severity: Severity, fix_task: bool) -> (Record, Option<Record>) {
        let mut draft = BugDraft::new(title, severity, BugSource::Testing);
        draft.fix_task = fix_task;
        let created = store.create_bug(draft).unwrap();
        (created.bug, created.fix_task)
    }

    fn complete(store: &Store, id: &str) {
        store
            .transition(Collection::Tasks, id, Status::InProgress, None)
            .unwrap();
        store
            .transition(Collection::Tasks, id, Status::Completed, None)
            .unwrap();
    }

    #[test]
    fn test_fix_task_is_generated_with_mapped_priority() {
        let env = TestEnv::new();
        let store = env.init_store();
        for (n, severity) in Severity::all().into_iter().enumerate() {
            let (bug, fix) = make_bug(&store, &format!("Bug {}", n), severity, true);
            let fix = fix.unwrap();
            assert_eq!(fix.priority, severity.fix_priority());
            assert!(fix.is_bug_fix());
            assert_eq!(fix.title, format!("Fix: Bug {}", n));
            assert_eq!(store.fix_tasks_for(&bug.id).unwrap(), vec![fix]);
        }
    }

    #[test]
    fn test_close_without_fix_is_recorded_distinctly() {
        let env = TestEnv::new();
        let store = env.init_store();
        let (b, _) = make_bug(&store, "Flaky", Severity::Medium, false);

        assert!(matches!(store.close_bug(&b.id, "  "), Err(Error::Validation(_))));
        let closed = store.close_bug(&b.id, "cannot reproduce").unwrap();
        assert!(matches!(
            closed.kind,
            RecordKind::Bug {
                closure: Some(Closure::WithoutFix { .. }),
                ..
            }
        ));

        // Closing twice is an invalid transition.
        assert!(matches!(
            store.close_bug(&b.id, "again"),
            Err(Error::InvalidTransition { .. })
        ));

        let metrics = store.bug_metrics(Utc::now()).unwrap();
        let medium = metrics
            .by_severity
            .iter()
            .find(|m| m.severity == Severity::Medium)
            .unwrap();
        assert_eq!(medium.closed_without_fix, 1);
        assert_eq!(medium.fixed, 0);
    }

    #[test]
    fn test_second_fix_task_does_not_reclose() {
        let env = TestEnv::new();
        let store = env.init_store();
        let (b, first) = make_bug(&store, "Leak", Severity::High, true);
        let second = store
            .create_task(TaskDraft {
                kind: crate::models::TaskKind::BugFix,
                bug_reference: Some(b.id.clone()),
                ..TaskDraft::new("Another angle on the leak")
            })
            .unwrap();

        complete(&store, &first.unwrap().id);
        store
            .transition(Collection::Tasks, &second.id, Status::InProgress, None)
            .unwrap();
        let outcome = store
            .transition(Collection::Tasks, &second.id, Status::Completed, None)
            .unwrap();
        assert!(outcome.closed_bug.is_none());
        assert_eq!(store.fix_tasks_for(&b.id).unwrap().len(), 2);
    }

    #[test]
    fn test_metrics_count_fixed_and_overdue() {
        let env = TestEnv::new();
        let store = env.init_store();
        let (_, fix) = make_bug(&store, "Crash", Severity::Critical, true);
        make_bug(&store, "Typo", Severity::Low, false);
        complete(&store, &fix.unwrap().id);

        let metrics = store.bug_metrics(Utc::now()).unwrap();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.open, 1);
        assert_eq!(metrics.overdue, 0);

        // Forty days on, the open low-severity bug is past its 30 day window.
        let later = store.bug_metrics(Utc::now() + Duration::days(40)).unwrap();
        assert_eq!(later.overdue, 1);
        let critical = &later.by_severity[0];
        assert_eq!(critical.severity, Severity::Critical);
        assert_eq!(critical.fixed, 1);
        assert_eq!(critical.overdue, 0);
    }

    #[test]
    fn test_fix_tasks_for_missing_bug() {
        let env = TestEnv::new();
        let store = env.init_store();
        assert!(matches!(store.fix_tasks_for("0001"), Err(Error::NotFound(_))));
    }
}
