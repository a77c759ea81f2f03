//! Decomposition of a task into child records.
//!
//! [`Store::assess`] derives a [`WorkEstimate`] from a stored record and
//! scores it. [`Store::decompose`] applies the caller's decision to the
//! tier policy and, when the verdict is to decompose, creates the
//! children under hierarchical ids. The parent is left untouched; it
//! becomes a grouping header whose status the caller manages.

use chrono::Utc;
use serde::Serialize;

use super::{allocator, format, Area, Store};
use crate::models::complexity::{
    self, thresholds, CallerDecision, ComplexityScore, Tier, Verdict, WorkEstimate,
};
use crate::models::{body, ids, Collection, Record, TaskKind};
use crate::{Error, Result};

/// Open-map header keys read by the assessment.
pub const COMPONENTS_KEY: &str = "components";
pub const SIZE_POINTS_KEY: &str = "size_points";
pub const UNCERTAIN_KEY: &str = "requirements_uncertain";
/// Set on a complex task when the caller kept it whole; holds the time.
pub const OVERRIDE_KEY: &str = "decomposition_override";

/// Most children proposed from acceptance criteria.
const MAX_PROPOSED_FROM_CRITERIA: usize = 5;

/// Score of a stored record.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub id: String,
    pub estimate: WorkEstimate,
    pub score: ComplexityScore,
    /// When a complex task was last kept whole by override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overridden_at: Option<String>,
}

/// One child to create.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildDraft {
    pub title: String,
    /// Must be a subset of the parent's subsystems
    pub subsystems: Vec<String>,
    /// Must be a subset of the parent's acceptance criteria
    pub criteria: Vec<String>,
    pub objective: Option<String>,
    pub estimated_effort: Option<String>,
}

/// What a decomposition did.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub parent: Record,
    pub assessment: Assessment,
    pub verdict: Verdict,
    pub children: Vec<Record>,
    /// Child count fell outside the recommended range
    pub flagged_for_review: bool,
}

/// Derive the scoring inputs from a record.
pub fn estimate_for(record: &Record, downstream_blocked: usize) -> WorkEstimate {
    let components = match record.extra.get(COMPONENTS_KEY) {
        Some(toml::Value::Integer(n)) => usize::try_from(*n).unwrap_or(0),
        Some(toml::Value::Array(items)) => items.len(),
        Some(toml::Value::String(s)) => s.split(',').filter(|c| !c.trim().is_empty()).count(),
        _ => 0,
    };
    let size_points = match record.extra.get(SIZE_POINTS_KEY) {
        Some(toml::Value::Integer(n)) => u32::try_from(*n).ok(),
        _ => None,
    };
    let flagged_uncertain = matches!(record.extra.get(UNCERTAIN_KEY), Some(toml::Value::Boolean(true)));

    WorkEstimate {
        effort_days: record
            .estimated_effort
            .as_deref()
            .and_then(complexity::parse_effort_days),
        subsystems: record.subsystems.len(),
        components,
        requirements_uncertain: flagged_uncertain
            || complexity::has_uncertainty_markers(&record.title)
            || complexity::body_has_uncertainty_markers(&record.body),
        deliverables: body::deliverables(&record.body).len(),
        downstream_blocked,
        acceptance_criteria: body::acceptance_criteria(&record.body).len(),
        size_points,
    }
}

/// Propose children for a parent when the caller gives none.
///
/// One child per subsystem when there are at least three; otherwise the
/// acceptance criteria are spread over up to five children when there
/// are at least three. Returns an empty list when neither applies.
pub fn propose_children(parent: &Record) -> Vec<ChildDraft> {
    let criteria = body::acceptance_criteria(&parent.body);

    if parent.subsystems.len() >= thresholds::MIN_SUBSYSTEMS {
        return parent
            .subsystems
            .iter()
            .map(|subsystem| {
                let needle = subsystem.to_lowercase();
                ChildDraft {
                    title: format!("{}: {}", parent.title, subsystem),
                    subsystems: vec![subsystem.clone()],
                    criteria: criteria
                        .iter()
                        .filter(|c| c.to_lowercase().contains(&needle))
                        .cloned()
                        .collect(),
                    objective: Some(format!("Cover the {} part of {}.", subsystem, parent.id)),
                    estimated_effort: None,
                }
            })
            .collect();
    }

    if criteria.len() >= thresholds::MIN_CHILDREN {
        let count = criteria.len().min(MAX_PROPOSED_FROM_CRITERIA);
        let per_child = criteria.len().div_ceil(count);
        let chunks: Vec<&[String]> = criteria.chunks(per_child).collect();
        let total = chunks.len();
        return chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| ChildDraft {
                title: format!("{} (part {} of {})", parent.title, i + 1, total),
                subsystems: parent.subsystems.clone(),
                criteria: chunk.to_vec(),
                objective: None,
                estimated_effort: None,
            })
            .collect();
    }

    Vec::new()
}

/// Children with caller-chosen titles. The parent's acceptance criteria
/// and subsystems are dealt out in order, earlier children taking the
/// remainder.
pub fn titled_children(parent: &Record, titles: Vec<String>) -> Vec<ChildDraft> {
    let count = titles.len();
    let criteria = spread(body::acceptance_criteria(&parent.body), count);
    let subsystems = spread(parent.subsystems.clone(), count);
    titles
        .into_iter()
        .zip(criteria)
        .zip(subsystems)
        .map(|((title, criteria), subsystems)| ChildDraft {
            title,
            subsystems,
            criteria,
            objective: None,
            estimated_effort: None,
        })
        .collect()
}

/// Split `items` into `parts` contiguous runs whose sizes differ by at most one.
fn spread(items: Vec<String>, parts: usize) -> Vec<Vec<String>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;
    let mut items = items.into_iter();
    (0..parts)
        .map(|i| items.by_ref().take(base + usize::from(i < extra)).collect())
        .collect()
}

impl Store {
    /// Score a stored record.
    pub fn assess(&self, collection: Collection, id: &str) -> Result<Assessment> {
        let record = self.get(collection, id)?;
        let me = record.reference();
        let mut downstream = 0;
        for other in Collection::all() {
            for dependent in self.backend(other).load(Area::Active)? {
                if !dependent.status.is_terminal() && dependent.dependency_refs()?.contains(&me) {
                    downstream += 1;
                }
            }
        }
        let estimate = estimate_for(&record, downstream);
        let score = complexity::score_estimate(&estimate);
        tracing::debug!(id = %id, score = score.score, tier = %score.tier, "assessed record");
        let overridden_at = match record.extra.get(OVERRIDE_KEY) {
            Some(toml::Value::String(at)) => Some(at.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        };
        Ok(Assessment {
            id: record.id,
            estimate,
            score,
            overridden_at,
        })
    }

    /// Decompose a task according to its tier and the caller's decision.
    ///
    /// With no `drafts`, children are proposed from the parent. Counts
    /// outside 3..=8 are allowed but flagged for review.
    pub fn decompose(
        &self,
        id: &str,
        decision: CallerDecision,
        drafts: Vec<ChildDraft>,
    ) -> Result<Decomposition> {
        let (mut parent, area) = self.locate(Collection::Tasks, id)?;
        if area == Area::Archive {
            return Err(Error::Validation(format!("task {} is archived; restore it first", id)));
        }
        let mut assessment = self.assess(Collection::Tasks, id)?;
        let verdict = assessment.score.resolve(decision)?;
        if verdict == Verdict::Skip {
            if assessment.score.tier == Tier::Complex && decision == CallerDecision::Override {
                let at = Utc::now().to_rfc3339();
                parent
                    .extra
                    .insert(OVERRIDE_KEY.to_string(), toml::Value::String(at.clone()));
                self.commit(&parent)?;
                assessment.overridden_at = Some(at);
                tracing::warn!(id = %id, score = assessment.score.score, "complex task kept whole by override");
            }
            tracing::info!(id = %id, tier = %assessment.score.tier, decision = ?decision, "decomposition skipped");
            return Ok(Decomposition {
                parent,
                assessment,
                verdict,
                children: Vec::new(),
                flagged_for_review: false,
            });
        }
        if parent.status.is_terminal() {
            return Err(Error::Validation(format!(
                "task {} is {}; reopen it before decomposing",
                id, parent.status
            )));
        }

        let drafts = if drafts.is_empty() {
            propose_children(&parent)
        } else {
            drafts
        };
        if drafts.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no children given for {} and none can be proposed (needs 3+ subsystems or 3+ acceptance criteria)",
                id
            )));
        }
        check_drafts(&parent, &drafts)?;

        let flagged_for_review =
            !(thresholds::MIN_CHILDREN..=thresholds::MAX_CHILDREN).contains(&drafts.len());
        if flagged_for_review {
            tracing::warn!(
                id = %id,
                children = drafts.len(),
                "child count outside {}-{}, flagged for review",
                thresholds::MIN_CHILDREN,
                thresholds::MAX_CHILDREN
            );
        }

        // Every child must encode before the first one is written.
        let mut pending = Vec::with_capacity(drafts.len());
        for (n, draft) in drafts.into_iter().enumerate() {
            let placeholder = ids::child(&parent.id, n as u64 + 1);
            let mut child = Record::task(placeholder, draft.title.trim(), TaskKind::Task);
            child.parent_id = Some(parent.id.clone());
            child.priority = parent.priority;
            child.feature = parent.feature.clone();
            child.subsystems = draft.subsystems;
            child.estimated_effort = draft.estimated_effort;
            child.body = body::compose(draft.objective.as_deref(), &draft.criteria);
            format::validate(&child)?;
            pending.push(child);
        }

        let backend = self.backend(Collection::Tasks);
        let mut children: Vec<Record> = Vec::with_capacity(pending.len());
        let mut written = Vec::with_capacity(pending.len());
        for mut child in pending {
            let claimed = allocator::allocate_child(backend, &parent.id).and_then(|child_id| {
                child.id = child_id;
                allocator::claim(backend, &child)
            });
            if let Err(e) = claimed {
                return Err(self.batch_failed(
                    Collection::Tasks,
                    written,
                    e,
                    format!(
                        "the listed children were created; add the rest with `wb task create --parent {}`",
                        parent.id
                    ),
                ));
            }
            written.push(child.id.clone());
            children.push(child);
        }

        self.refresh_index(Collection::Tasks, &written)?;
        tracing::info!(id = %id, children = ?written, "decomposed task");
        Ok(Decomposition {
            parent,
            assessment,
            verdict,
            children,
            flagged_for_review,
        })
    }
}

/// Titles must be usable and every child must draw from the parent.
fn check_drafts(parent: &Record, drafts: &[ChildDraft]) -> Result<()> {
    let criteria = body::acceptance_criteria(&parent.body);
    for draft in drafts {
        if draft.title.trim().is_empty() || draft.title.contains('\n') {
            return Err(Error::Validation("child titles must be a single non-empty line".to_string()));
        }
        if let Some(s) = draft.subsystems.iter().find(|s| !parent.subsystems.contains(s)) {
            return Err(Error::Validation(format!(
                "child \"{}\" lists subsystem {} which {} does not have",
                draft.title, s, parent.id
            )));
        }
        if let Some(c) = draft.criteria.iter().find(|c| !criteria.contains(c)) {
            return Err(Error::Validation(format!(
                "child \"{}\" lists criterion \"{}\" which {} does not have",
                draft.title, c, parent.id
            )));
        }
    }
    Ok(())
}
