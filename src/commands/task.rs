//! Task commands: creation, rollup, complexity and decomposition, import.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use super::{json, Context, Output, RecordResult, RecordView};
use crate::models::complexity::{
    CallerDecision, DecompositionPolicy, Signal, Tier, Verdict, WorkEstimate,
};
use crate::models::Collection;
use crate::storage::decompose::{self, Assessment};
use crate::storage::{format, TaskDraft};
use crate::{Error, Result};

/// Create a task.
pub fn task_create(ctx: &Context, draft: TaskDraft) -> Result<RecordResult> {
    let record = ctx.open_store()?.create_task(draft)?;
    Ok(RecordResult::new("Created", &record, false))
}

/// Complete a parent once all of its children are completed.
pub fn task_rollup(ctx: &Context, id: &str) -> Result<RecordResult> {
    let record = ctx.open_store()?.complete_group(Collection::Tasks, id)?;
    Ok(RecordResult::new("Completed", &record, false))
}

/// Complexity assessment of a task.
#[derive(Serialize)]
pub struct AssessResult {
    pub id: String,
    pub score: u8,
    pub tier: Tier,
    pub policy: DecompositionPolicy,
    pub signals: Vec<Signal>,
    pub reasons: Vec<String>,
    pub estimate: WorkEstimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overridden_at: Option<String>,
}

impl From<Assessment> for AssessResult {
    fn from(a: Assessment) -> Self {
        Self {
            id: a.id,
            score: a.score.score,
            tier: a.score.tier,
            policy: a.score.tier.policy(),
            prompt: a.score.prompt(),
            signals: a.score.signals,
            reasons: a.score.reasons,
            estimate: a.estimate,
            overridden_at: a.overridden_at,
        }
    }
}

impl Output for AssessResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Task {}: score {} ({})", self.id, self.score, self.tier);
        if self.reasons.is_empty() {
            out.push_str("\n  Work appears well-scoped.");
        }
        for reason in &self.reasons {
            out.push_str(&format!("\n  - {}", reason));
        }
        if let Some(at) = &self.overridden_at {
            out.push_str(&format!("\n  Decomposition overridden at {}", at));
        }
        if let Some(prompt) = &self.prompt {
            out.push_str("\n\n");
            out.push_str(prompt.trim_end());
        }
        out
    }
}

/// Score a task.
pub fn task_assess(ctx: &Context, id: &str) -> Result<AssessResult> {
    let assessment = ctx.open_store()?.assess(Collection::Tasks, id)?;
    Ok(assessment.into())
}

/// Outcome of a decomposition request.
#[derive(Serialize)]
pub struct DecomposeResult {
    pub id: String,
    pub score: u8,
    pub tier: Tier,
    /// `None` while the caller still has to answer the prompt
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub flagged_for_review: bool,
    pub children: Vec<RecordView>,
}

impl Output for DecomposeResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match self.verdict {
            None => format!(
                "{}\nRe-run with --decision to answer.",
                self.prompt.as_deref().unwrap_or_default().trim_end()
            ),
            Some(Verdict::Skip) => format!(
                "Kept task {} as a single task (score {}, {})",
                self.id, self.score, self.tier
            ),
            Some(Verdict::Decompose) => {
                let mut lines = vec![format!(
                    "Decomposed task {} into {} tasks (score {}, {}):",
                    self.id,
                    self.children.len(),
                    self.score,
                    self.tier
                )];
                lines.extend(self.children.iter().map(|c| format!("  {}", c.line())));
                if self.flagged_for_review {
                    lines.push("Child count is outside 3-8; review the split.".to_string());
                }
                lines.join("\n")
            }
        }
    }
}

/// Decompose a task.
///
/// Without a decision, tiers that ask the caller return the prompt and
/// change nothing; very complex tasks proceed as accepted.
pub fn task_decompose(
    ctx: &Context,
    id: &str,
    decision: Option<CallerDecision>,
    child_titles: Vec<String>,
) -> Result<DecomposeResult> {
    let store = ctx.open_store()?;
    let decision = match decision {
        Some(decision) => decision,
        None => {
            let assessment = store.assess(Collection::Tasks, id)?;
            match assessment.score.tier.policy() {
                DecompositionPolicy::AskCaller | DecompositionPolicy::Required => {
                    return Ok(DecomposeResult {
                        id: assessment.id,
                        score: assessment.score.score,
                        tier: assessment.score.tier,
                        verdict: None,
                        prompt: assessment.score.prompt(),
                        flagged_for_review: false,
                        children: Vec::new(),
                    });
                }
                DecompositionPolicy::NotNeeded | DecompositionPolicy::Mandatory => {
                    CallerDecision::Accept
                }
            }
        }
    };

    let drafts = if child_titles.is_empty() {
        Vec::new()
    } else {
        let parent = store.get(Collection::Tasks, id)?;
        decompose::titled_children(&parent, child_titles)
    };
    let result = store.decompose(id, decision, drafts)?;
    Ok(DecomposeResult {
        id: result.parent.id,
        score: result.assessment.score.score,
        tier: result.assessment.score.tier,
        verdict: Some(result.verdict),
        prompt: None,
        flagged_for_review: result.flagged_for_review,
        children: result
            .children
            .iter()
            .map(|c| RecordView::new(c, false))
            .collect(),
    })
}

#[derive(Serialize)]
pub struct ImportResult {
    pub collection: Collection,
    pub count: usize,
    pub imported: Vec<String>,
}

impl Output for ImportResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Imported {} {}: {}",
            self.count,
            self.collection,
            self.imported.join(", ")
        )
    }
}

/// Import record files into a collection. Nothing is written unless
/// every file parses and the whole batch validates.
pub fn import(ctx: &Context, collection: Collection, files: &[PathBuf]) -> Result<ImportResult> {
    let mut records = Vec::new();
    for path in files {
        let text = fs::read_to_string(path)?;
        let record = format::decode(&text)
            .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))?;
        records.push(record);
    }
    let imported = ctx.open_store()?.import(collection, records)?;
    Ok(ImportResult {
        collection,
        count: imported.len(),
        imported,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedConfig;
    use crate::models::body;
    use crate::models::{Priority, Record, TaskKind};
    use crate::test_utils::TestEnv;

    fn context(env: &TestEnv) -> Context {
        Context::new(env.path(), ResolvedConfig::default())
    }

    #[test]
    fn test_decompose_without_decision_returns_prompt() {
        let env = TestEnv::new();
        let store = env.init_store();
        let task = store
            .create_task(TaskDraft {
                estimated_effort: Some("1w".to_string()),
                ..TaskDraft::new("Moderate work")
            })
            .unwrap();

        let ctx = context(&env);
        let result = task_decompose(&ctx, &task.id, None, Vec::new()).unwrap();
        assert_eq!(result.tier, Tier::Moderate);
        assert!(result.verdict.is_none());
        assert!(result.prompt.as_deref().unwrap().contains("decline"));
        assert!(result.children.is_empty());

        let declined =
            task_decompose(&ctx, &task.id, Some(CallerDecision::Decline), Vec::new()).unwrap();
        assert_eq!(declined.verdict, Some(Verdict::Skip));
    }

    #[test]
    fn test_decompose_with_titles() {
        let env = TestEnv::new();
        let store = env.init_store();
        let task = store
            .create_task(TaskDraft {
                priority: Some(Priority::Low),
                estimated_effort: Some("3d".to_string()),
                ..TaskDraft::new("Split me")
            })
            .unwrap();

        let titles = vec!["One".to_string(), "Two".to_string(), "Three".to_string()];
        let result =
            task_decompose(&context(&env), &task.id, Some(CallerDecision::Accept), titles).unwrap();
        assert_eq!(result.verdict, Some(Verdict::Decompose));
        let ids: Vec<&str> = result.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["0001.1", "0001.2", "0001.3"]);
        assert!(result.children.iter().all(|c| c.priority == Priority::Low));
        assert!(result.to_human().contains("into 3 tasks"));
    }

    #[test]
    fn test_decompose_titles_inherit_criteria_and_subsystems() {
        let env = TestEnv::new();
        let store = env.init_store();
        let criteria: Vec<String> = ["parses", "renders", "saves"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let task = store
            .create_task(TaskDraft {
                estimated_effort: Some("3d".to_string()),
                subsystems: vec!["cli".to_string(), "storage".to_string()],
                body: body::compose(None, &criteria),
                ..TaskDraft::new("Split me")
            })
            .unwrap();

        let titles = vec!["One".to_string(), "Two".to_string(), "Three".to_string()];
        task_decompose(&context(&env), &task.id, Some(CallerDecision::Accept), titles).unwrap();

        let first = store.get(Collection::Tasks, "0001.1").unwrap();
        assert_eq!(first.subsystems, vec!["cli".to_string()]);
        assert_eq!(body::acceptance_criteria(&first.body), vec!["parses".to_string()]);
        let third = store.get(Collection::Tasks, "0001.3").unwrap();
        assert!(third.subsystems.is_empty());
        assert_eq!(body::acceptance_criteria(&third.body), vec!["saves".to_string()]);
    }

    #[test]
    fn test_assess_result_human() {
        let env = TestEnv::new();
        let store = env.init_store();
        store.create_task(TaskDraft::new("Small")).unwrap();
        let result = task_assess(&context(&env), "0001").unwrap();
        assert_eq!(result.score, 0);
        assert!(result.prompt.is_none());
        assert!(result.to_human().contains("well-scoped"));
    }

    #[test]
    fn test_import_from_files() {
        let env = TestEnv::new();
        env.init_store();
        let source = tempfile::TempDir::new().unwrap();

        let parent = Record::task("0010", "Imported parent", TaskKind::Feature);
        let mut child = Record::task("0010.1", "Imported child", TaskKind::Task);
        child.parent_id = Some("0010".to_string());
        child.dependencies = vec!["0010".to_string()];
        let mut files = Vec::new();
        for record in [&child, &parent] {
            let path = source.path().join(format!("{}.md", record.id));
            fs::write(&path, format::encode(record).unwrap()).unwrap();
            files.push(path);
        }

        let result = import(&context(&env), Collection::Tasks, &files).unwrap();
        assert_eq!(result.imported, vec!["0010".to_string(), "0010.1".to_string()]);
    }

    #[test]
    fn test_import_rejects_unparseable_file() {
        let env = TestEnv::new();
        env.init_store();
        let source = tempfile::TempDir::new().unwrap();
        let path = source.path().join("junk.md");
        fs::write(&path, "not a record").unwrap();
        assert!(matches!(
            import(&context(&env), Collection::Tasks, &[path]),
            Err(Error::InvalidInput(_))
        ));
    }
}
