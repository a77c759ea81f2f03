//! Identifier allocation with claim-and-verify.
//!
//! There is no lock across writer processes. Allocation re-reads the ids
//! on disk immediately before computing the next one, and [`claim`]
//! re-reads every stored creation of the id right after the write. If
//! anything other than the caller's own record claims the id, the
//! result is `Conflict` and both records stay on disk for manual
//! renumbering.

use super::backend::RecordBackend;
use crate::models::{ids, Record};
use crate::{Error, Result};

/// Next free top-level id, computed from a fresh read.
pub fn allocate_top_level(backend: &dyn RecordBackend, width: usize) -> Result<String> {
    let existing = backend.ids()?;
    let id = ids::next_top_level(&existing, width)?;
    tracing::debug!(id = %id, existing = existing.len(), "allocated top-level id");
    Ok(id)
}

/// Next free direct child id of `parent`, computed from a fresh read.
pub fn allocate_child(backend: &dyn RecordBackend, parent: &str) -> Result<String> {
    ids::validate(parent)?;
    let existing = backend.ids()?;
    let id = ids::next_child(&existing, parent)?;
    tracing::debug!(id = %id, parent = %parent, "allocated child id");
    Ok(id)
}

/// Persist a new record and verify that it alone claims its id.
pub fn claim(backend: &dyn RecordBackend, record: &Record) -> Result<()> {
    if let Err(e) = backend.create(record) {
        if let Error::Conflict { id, detail } = &e {
            tracing::warn!(id = %id, detail = %detail, "id already taken before write");
        }
        return Err(e);
    }

    let claims = backend.claims(&record.id).inspect_err(|e| {
        tracing::warn!(id = %record.id, error = %e, "could not verify claim");
    })?;
    let ours = claims
        .iter()
        .filter(|c| c.created_at == record.created_at && c.title == record.title)
        .count();
    if claims.len() == 1 && ours == 1 {
        return Ok(());
    }

    let others: Vec<String> = claims
        .iter()
        .filter(|c| !(c.created_at == record.created_at && c.title == record.title))
        .map(|c| format!("\"{}\" created {}", c.title, c.created_at.to_rfc3339()))
        .collect();
    let detail = if claims.is_empty() {
        "record vanished after write".to_string()
    } else {
        format!(
            "{} records claim this id (other: {}); renumber one of them",
            claims.len(),
            others.join(", ")
        )
    };
    tracing::warn!(id = %record.id, detail = %detail, "id collision after write");
    Err(Error::Conflict {
        id: record.id.clone(),
        detail,
    })
}
