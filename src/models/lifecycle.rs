//! Status state machine.
//!
//! Allowed edges:
//!
//! ```text
//! pending ──> in_progress ──> completed
//!    ^             │              │
//!    │             └────> failed  │
//!    └──────── reopen ────┴───────┘
//! ```
//!
//! Anything else is an `InvalidTransition`. Bugs additionally have a
//! closure edge (pending/in_progress -> completed) used when their fix
//! task completes or when they are closed manually.

use chrono::{DateTime, Utc};

use super::body;
use super::{Closure, Record, RecordKind, Status};
use crate::{Error, Result};

/// Check a requested status edge.
pub fn check(from: Status, to: Status) -> Result<()> {
    let allowed = matches!(
        (from, to),
        (Status::Pending, Status::InProgress)
            | (Status::InProgress, Status::Completed)
            | (Status::InProgress, Status::Failed)
            | (Status::Completed, Status::Pending)
            | (Status::Failed, Status::Pending)
    );
    if allowed {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

/// Apply a transition to a record, stamping side effects.
///
/// - entering `completed` stamps `completed_at`
/// - entering `failed` requires a reason, appended to the body
/// - reopening clears `completed_at` (and a bug's closure)
pub fn apply(
    record: &mut Record,
    to: Status,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    check(record.status, to)?;

    match to {
        Status::Completed => {
            record.completed_at = Some(now);
        }
        Status::Failed => {
            let reason = reason.map(str::trim).filter(|r| !r.is_empty()).ok_or_else(|| {
                Error::Validation("a reason is required to mark a record failed".to_string())
            })?;
            record.body = body::append_to_section(
                &record.body,
                body::FAILURE,
                &format!("{}: {}", now.format("%Y-%m-%d %H:%M UTC"), reason),
            );
        }
        Status::Pending => {
            record.completed_at = None;
            if let RecordKind::Bug { closure, .. } = &mut record.kind {
                *closure = None;
            }
        }
        Status::InProgress => {}
    }

    record.status = to;
    Ok(())
}

/// Close a bug, recording how it was closed.
pub fn close_bug(record: &mut Record, how: Closure, now: DateTime<Utc>) -> Result<()> {
    let RecordKind::Bug { closure, .. } = &mut record.kind else {
        return Err(Error::Validation(format!(
            "{} is not a bug and cannot be closed",
            record.id
        )));
    };
    if record.status.is_terminal() {
        return Err(Error::InvalidTransition {
            from: record.status,
            to: Status::Completed,
        });
    }
    *closure = Some(how);
    record.status = Status::Completed;
    record.completed_at = Some(now);
    Ok(())
}
