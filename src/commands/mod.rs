//! Command implementations for the `wb` CLI.
//!
//! Each command opens the workbook, runs store operations and returns a
//! result that prints as JSON or as human-readable text. Commands are
//! organized by entity type:
//! - this module - `init`, record views shared by both collections, index,
//!   config and action log commands
//! - `task` - creation, readiness, complexity assessment and decomposition
//! - `bug` - reporting, closing without a fix and metrics

mod bug;
mod task;

pub use bug::*;
pub use task::*;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action_log::{self, ActionLog};
use crate::config::schema::{workbook_config_path, WORKBOOK_DIR};
use crate::config::{ResolvedConfig, WorkbookConfig};
use crate::models::{
    BugSource, Closure, Collection, Priority, Record, RecordKind, Severity, Status,
};
use crate::storage::index::{IndexDrift, IndexEntry, IndexFilter};
use crate::storage::{
    Area, IndexSyncResult, RecordFilter, RecordUpdate, StorageStrategy, Store,
};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn is_false(value: &bool) -> bool {
    !value
}

/// Where commands run and the configuration they run with.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub config: ResolvedConfig,
}

impl Context {
    pub fn new(root: impl Into<PathBuf>, config: ResolvedConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn open_store(&self) -> Result<Store> {
        Store::open(&self.root, &self.config.to_config())
    }
}

// === Record views ===

/// Serializable view of a record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub id: String,
    pub collection: Collection,
    pub title: String,
    pub kind: String,
    pub status: Status,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subsystems: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<BugSource>,
    /// `fixed` or `without_fix` for closed bugs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_as: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "is_false")]
    pub archived: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip)]
    prefix: &'static str,
    #[serde(skip)]
    status_label: &'static str,
}

impl RecordView {
    pub fn new(record: &Record, archived: bool) -> Self {
        let (severity, source, closure) = match &record.kind {
            RecordKind::Bug {
                severity,
                source,
                closure,
            } => (Some(*severity), Some(*source), closure.as_ref()),
            RecordKind::Task { .. } => (None, None, None),
        };
        let (closed_as, fixed_by, close_reason) = match closure {
            Some(Closure::Fixed { task_id }) => (Some("fixed"), Some(task_id.clone()), None),
            Some(Closure::WithoutFix { reason }) => (Some("without_fix"), None, Some(reason.clone())),
            None => (None, None, None),
        };
        Self {
            id: record.id.clone(),
            collection: record.collection(),
            title: record.title.clone(),
            kind: record.kind.as_str().to_string(),
            status: record.status,
            priority: record.priority,
            parent_id: record.parent_id.clone(),
            dependencies: record.dependencies.clone(),
            feature: record.feature.clone(),
            subsystems: record.subsystems.clone(),
            estimated_effort: record.estimated_effort.clone(),
            bug_reference: record.bug_reference().map(str::to_string),
            severity,
            source,
            closed_as,
            fixed_by,
            close_reason,
            created_at: record.created_at,
            completed_at: record.completed_at,
            archived,
            body: record.body.clone(),
            prefix: record.kind.type_prefix(),
            status_label: record.status_label(),
        }
    }

    /// Single-line summary.
    pub fn line(&self) -> String {
        let mut line = format!(
            "{} {} [{}] {} ({}, {})",
            self.status.glyph(),
            self.id,
            self.prefix,
            self.title,
            self.status_label,
            self.priority
        );
        if self.archived {
            line.push_str(" [archived]");
        }
        line
    }

    /// Multi-line description with the body.
    pub fn details(&self) -> String {
        let mut lines = vec![format!("{} [{}] {}", self.id, self.prefix, self.title)];
        lines.push(format!(
            "  Status: {}  Priority: {}  Kind: {}",
            self.status_label, self.priority, self.kind
        ));
        if let (Some(severity), Some(source)) = (self.severity, self.source) {
            lines.push(format!("  Severity: {}  Source: {}", severity, source));
        }
        if let Some(parent) = &self.parent_id {
            lines.push(format!("  Parent: {}", parent));
        }
        if !self.dependencies.is_empty() {
            lines.push(format!("  Depends on: {}", self.dependencies.join(", ")));
        }
        if let Some(feature) = &self.feature {
            lines.push(format!("  Feature: {}", feature));
        }
        if !self.subsystems.is_empty() {
            lines.push(format!("  Subsystems: {}", self.subsystems.join(", ")));
        }
        if let Some(effort) = &self.estimated_effort {
            lines.push(format!("  Effort: {}", effort));
        }
        if let Some(bug) = &self.bug_reference {
            lines.push(format!("  Fixes bug: {}", bug));
        }
        match (&self.fixed_by, &self.close_reason) {
            (Some(task), _) => lines.push(format!("  Fixed by task {}", task)),
            (None, Some(reason)) => lines.push(format!("  Closed without fix: {}", reason)),
            _ => {}
        }
        lines.push(format!(
            "  Created: {}",
            self.created_at.format("%Y-%m-%d %H:%M UTC")
        ));
        if let Some(done) = self.completed_at {
            lines.push(format!("  Completed: {}", done.format("%Y-%m-%d %H:%M UTC")));
        }
        if self.archived {
            lines.push("  Archived".to_string());
        }
        if !self.body.is_empty() {
            lines.push(String::new());
            lines.push(self.body.clone());
        }
        lines.join("\n")
    }
}

/// A record after a single-record command.
#[derive(Serialize)]
pub struct RecordResult {
    #[serde(skip)]
    pub action: &'static str,
    #[serde(flatten)]
    pub record: RecordView,
}

impl RecordResult {
    pub fn new(action: &'static str, record: &Record, archived: bool) -> Self {
        Self {
            action,
            record: RecordView::new(record, archived),
        }
    }
}

impl Output for RecordResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{} {} {}: {}",
            self.action,
            self.record.collection.ref_prefix(),
            self.record.id,
            self.record.title
        )
    }
}

/// A record with its readiness and relations.
#[derive(Serialize)]
pub struct RecordDetail {
    #[serde(flatten)]
    pub record: RecordView,
    pub ready: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waiting_on: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Tasks whose `bug_reference` points here (bugs only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fix_tasks: Vec<LinkedRecord>,
}

/// Short reference to a related record.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedRecord {
    pub id: String,
    pub title: String,
    pub status: Status,
}

impl Output for RecordDetail {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = self.record.details();
        out.push('\n');
        if self.ready {
            out.push_str("\nReady: yes");
        } else {
            out.push_str(&format!("\nWaiting on: {}", self.waiting_on.join(", ")));
        }
        if !self.children.is_empty() {
            out.push_str(&format!("\nChildren: {}", self.children.join(", ")));
        }
        if !self.fix_tasks.is_empty() {
            out.push_str("\nFix tasks:");
            for task in &self.fix_tasks {
                out.push_str(&format!("\n  {} {} ({})", task.id, task.title, task.status));
            }
        }
        out
    }
}

/// Show one record.
pub fn record_show(ctx: &Context, collection: Collection, id: &str) -> Result<RecordDetail> {
    let store = ctx.open_store()?;
    let (record, area) = store.locate(collection, id)?;
    let readiness = store.is_ready(collection, id)?;
    let children = store
        .list(
            collection,
            &RecordFilter {
                parent: Some(record.id.clone()),
                include_archived: true,
                ..Default::default()
            },
        )?
        .into_iter()
        .map(|child| child.id)
        .collect();
    let fix_tasks = match collection {
        Collection::Bugs => store
            .fix_tasks_for(id)?
            .into_iter()
            .map(|task| LinkedRecord {
                id: task.id,
                title: task.title,
                status: task.status,
            })
            .collect(),
        Collection::Tasks => Vec::new(),
    };
    Ok(RecordDetail {
        record: RecordView::new(&record, area == Area::Archive),
        ready: readiness.ready,
        waiting_on: readiness
            .waiting_on
            .iter()
            .map(|r| r.to_reference(collection))
            .collect(),
        children,
        fix_tasks,
    })
}

/// A listing of records.
#[derive(Serialize)]
pub struct RecordList {
    pub collection: Collection,
    pub count: usize,
    pub records: Vec<RecordView>,
}

impl RecordList {
    fn new(collection: Collection, records: Vec<RecordView>) -> Self {
        Self {
            collection,
            count: records.len(),
            records,
        }
    }
}

impl Output for RecordList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return format!("No {} found.", self.collection);
        }
        let mut lines = vec![format!("{} {}:", self.count, self.collection)];
        lines.extend(self.records.iter().map(|r| format!("  {}", r.line())));
        lines.join("\n")
    }
}

/// List records read directly from storage.
pub fn record_list(ctx: &Context, collection: Collection, filter: &RecordFilter) -> Result<RecordList> {
    let store = ctx.open_store()?;
    let records = store
        .records(collection)?
        .into_iter()
        .filter(|(record, area)| filter.matches(record, *area))
        .map(|(record, area)| RecordView::new(&record, area == Area::Archive))
        .collect();
    Ok(RecordList::new(collection, records))
}

/// A listing read from the Master Index.
#[derive(Serialize)]
pub struct IndexEntryList {
    pub collection: Collection,
    pub count: usize,
    pub entries: Vec<IndexEntry>,
}

impl Output for IndexEntryList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return format!("No {} found.", self.collection);
        }
        let mut lines = vec![format!("{} {} (from index):", self.count, self.collection)];
        lines.extend(self.entries.iter().map(|e| {
            format!(
                "  {} {} [{}] {} ({}, {})",
                e.status.glyph(),
                e.id,
                e.prefix,
                e.title,
                e.section,
                e.priority
            )
        }));
        lines.join("\n")
    }
}

/// List records by reading the Master Index.
pub fn index_query(ctx: &Context, collection: Collection, filter: &IndexFilter) -> Result<IndexEntryList> {
    let store = ctx.open_store()?;
    let entries = store.query(collection, filter)?;
    Ok(IndexEntryList {
        collection,
        count: entries.len(),
        entries,
    })
}

/// A record after an update, with the bug its completion closed.
#[derive(Serialize)]
pub struct UpdateResult {
    #[serde(flatten)]
    pub record: RecordView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_bug: Option<RecordView>,
}

impl Output for UpdateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!(
            "Updated {} {}: {} ({})",
            self.record.collection.ref_prefix(),
            self.record.id,
            self.record.title,
            self.record.status_label
        );
        if let Some(bug) = &self.closed_bug {
            out.push_str(&format!("\nClosed bug {}: {}", bug.id, bug.title));
        }
        out
    }
}

/// Update fields and optionally move the record to a new status.
pub fn record_update(
    ctx: &Context,
    collection: Collection,
    id: &str,
    update: RecordUpdate,
    status: Option<Status>,
    reason: Option<&str>,
) -> Result<UpdateResult> {
    if update.is_empty() && status.is_none() {
        return Err(Error::InvalidInput(
            "nothing to update; pass a field or --status".to_string(),
        ));
    }
    let store = ctx.open_store()?;
    let mut record = if update.is_empty() {
        None
    } else {
        Some(store.update(collection, id, update)?)
    };
    let mut closed_bug = None;
    if let Some(to) = status {
        let outcome = store.transition(collection, id, to, reason)?;
        record = Some(outcome.record);
        closed_bug = outcome.closed_bug.map(|bug| RecordView::new(&bug, false));
    }
    let record = match record {
        Some(record) => record,
        None => store.get(collection, id)?,
    };
    Ok(UpdateResult {
        record: RecordView::new(&record, false),
        closed_bug,
    })
}

/// Add one dependency.
pub fn dep_add(ctx: &Context, collection: Collection, id: &str, dep: &str) -> Result<RecordResult> {
    let record = ctx.open_store()?.add_dependency(collection, id, dep)?;
    Ok(RecordResult::new("Added dependency to", &record, false))
}

/// Remove one dependency.
pub fn dep_rm(ctx: &Context, collection: Collection, id: &str, dep: &str) -> Result<RecordResult> {
    let record = ctx.open_store()?.remove_dependency(collection, id, dep)?;
    Ok(RecordResult::new("Removed dependency from", &record, false))
}

/// Replace the dependency list.
pub fn dep_set(
    ctx: &Context,
    collection: Collection,
    id: &str,
    deps: Vec<String>,
) -> Result<RecordResult> {
    let record = ctx.open_store()?.set_dependencies(collection, id, deps)?;
    Ok(RecordResult::new("Set dependencies of", &record, false))
}

pub fn archive(ctx: &Context, collection: Collection, id: &str) -> Result<RecordResult> {
    let record = ctx.open_store()?.archive(collection, id)?;
    Ok(RecordResult::new("Archived", &record, true))
}

pub fn restore(ctx: &Context, collection: Collection, id: &str) -> Result<RecordResult> {
    let record = ctx.open_store()?.restore(collection, id)?;
    Ok(RecordResult::new("Restored", &record, false))
}

/// Records with all dependencies completed.
pub fn ready(ctx: &Context, collection: Collection) -> Result<RecordList> {
    let records = ctx
        .open_store()?
        .ready(collection)?
        .iter()
        .map(|record| RecordView::new(record, false))
        .collect();
    Ok(RecordList::new(collection, records))
}

/// A record waiting on dependencies.
#[derive(Serialize)]
pub struct BlockedView {
    #[serde(flatten)]
    pub record: RecordView,
    pub waiting_on: Vec<String>,
}

#[derive(Serialize)]
pub struct BlockedList {
    pub collection: Collection,
    pub count: usize,
    pub records: Vec<BlockedView>,
}

impl Output for BlockedList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return format!("No blocked {}.", self.collection);
        }
        let mut lines = vec![format!("{} blocked {}:", self.count, self.collection)];
        for blocked in &self.records {
            lines.push(format!("  {}", blocked.record.line()));
            lines.push(format!("    waiting on: {}", blocked.waiting_on.join(", ")));
        }
        lines.join("\n")
    }
}

/// Non-terminal records with incomplete dependencies.
pub fn blocked(ctx: &Context, collection: Collection) -> Result<BlockedList> {
    let records: Vec<BlockedView> = ctx
        .open_store()?
        .blocked(collection)?
        .into_iter()
        .map(|b| BlockedView {
            record: RecordView::new(&b.record, false),
            waiting_on: b
                .waiting_on
                .iter()
                .map(|r| r.to_reference(collection))
                .collect(),
        })
        .collect();
    Ok(BlockedList {
        collection,
        count: records.len(),
        records,
    })
}

// === Init ===

#[derive(Serialize)]
pub struct InitResult {
    pub root: String,
    /// False when the workbook already existed
    pub initialized: bool,
    pub tasks_storage: String,
    pub bugs_storage: String,
    pub config_path: String,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let verb = if self.initialized {
            "Initialized"
        } else {
            "Already initialized"
        };
        format!(
            "{} workbook at {}\n  tasks: {}\n  bugs: {}\n  config: {}",
            verb, self.root, self.tasks_storage, self.bugs_storage, self.config_path
        )
    }
}

/// Initialize a workbook and record its storage strategies in the
/// workbook config so later runs open it the same way.
pub fn init(ctx: &Context) -> Result<InitResult> {
    let existed = ctx.root.join(WORKBOOK_DIR).is_dir();
    let store = Store::init(&ctx.root, &ctx.config.to_config())?;

    let path = workbook_config_path(&ctx.root);
    let mut file = WorkbookConfig::load(&path)?;
    let strategies: Vec<StorageStrategy> = Collection::all()
        .into_iter()
        .map(|c| store.strategy(c))
        .collect();
    for (collection, strategy) in Collection::all().into_iter().zip(&strategies) {
        file.set_storage(collection, *strategy);
    }
    file.save(&path)?;
    tracing::info!(root = %ctx.root.display(), "initialized workbook");

    Ok(InitResult {
        root: ctx.root.display().to_string(),
        initialized: !existed,
        tasks_storage: store.strategy(Collection::Tasks).to_string(),
        bugs_storage: store.strategy(Collection::Bugs).to_string(),
        config_path: path.display().to_string(),
    })
}

// === Master Index ===

#[derive(Serialize)]
pub struct IndexSyncReport {
    pub results: Vec<IndexSyncResult>,
}

impl Output for IndexSyncReport {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.results
            .iter()
            .map(|r| {
                let state = if r.changed { "rewritten" } else { "unchanged" };
                format!("{} index {} ({} entries)", r.collection, state, r.entries)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn collections(only: Option<Collection>) -> Vec<Collection> {
    match only {
        Some(collection) => vec![collection],
        None => Collection::all().to_vec(),
    }
}

/// Regenerate Master Indexes from the records.
pub fn index_sync(ctx: &Context, only: Option<Collection>) -> Result<IndexSyncReport> {
    let store = ctx.open_store()?;
    let results = collections(only)
        .into_iter()
        .map(|c| store.sync_index(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(IndexSyncReport { results })
}

#[derive(Serialize)]
pub struct CollectionDrift {
    pub collection: Collection,
    pub clean: bool,
    #[serde(flatten)]
    pub drift: IndexDrift,
}

#[derive(Serialize)]
pub struct IndexVerifyReport {
    pub clean: bool,
    pub collections: Vec<CollectionDrift>,
}

impl Output for IndexVerifyReport {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for c in &self.collections {
            if c.clean {
                lines.push(format!("{} index: in sync", c.collection));
                continue;
            }
            lines.push(format!("{} index: drift found", c.collection));
            let d = &c.drift;
            for (label, ids) in [
                ("missing", &d.missing),
                ("orphaned", &d.orphaned),
                ("duplicated", &d.duplicated),
                ("malformed", &d.malformed),
            ] {
                if !ids.is_empty() {
                    lines.push(format!("  {}: {}", label, ids.join(", ")));
                }
            }
            for m in &d.mismatched {
                lines.push(format!(
                    "  mismatched {}: index has \"{}\", expected \"{}\"",
                    m.id, m.actual, m.expected
                ));
            }
        }
        if !self.clean {
            lines.push("Run `wb index sync` to rebuild.".to_string());
        }
        lines.join("\n")
    }
}

/// Compare Master Indexes with the records.
pub fn index_verify(ctx: &Context, only: Option<Collection>) -> Result<IndexVerifyReport> {
    let store = ctx.open_store()?;
    let mut report = Vec::new();
    for collection in collections(only) {
        let drift = store.verify_index(collection)?;
        report.push(CollectionDrift {
            collection,
            clean: drift.is_clean(),
            drift,
        });
    }
    Ok(IndexVerifyReport {
        clean: report.iter().all(|c| c.clean),
        collections: report,
    })
}

// === Config ===

#[derive(Serialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: String,
    pub source: String,
}

#[derive(Serialize)]
pub struct ConfigShow {
    pub root: String,
    pub values: Vec<ConfigValue>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let width = self.values.iter().map(|v| v.key.len()).max().unwrap_or(0);
        let mut lines = vec![format!("Workbook root: {}", self.root)];
        lines.extend(
            self.values
                .iter()
                .map(|v| format!("  {:width$}  {}  ({})", v.key, v.value, v.source, width = width)),
        );
        lines.join("\n")
    }
}

/// Resolved configuration with the source of each value.
pub fn config_show(ctx: &Context) -> Result<ConfigShow> {
    let c = &ctx.config;
    let mut values = vec![
        ConfigValue {
            key: "output-format".to_string(),
            value: c.output_format.value.as_str().to_string(),
            source: c.output_format.source.to_string(),
        },
        ConfigValue {
            key: "log-level".to_string(),
            value: c.log_level.value.clone(),
            source: c.log_level.source.to_string(),
        },
        ConfigValue {
            key: "action-log".to_string(),
            value: if c.action_log.value { "on" } else { "off" }.to_string(),
            source: c.action_log.source.to_string(),
        },
        ConfigValue {
            key: "id-width".to_string(),
            value: c.id_width.value.to_string(),
            source: c.id_width.source.to_string(),
        },
    ];
    for collection in Collection::all() {
        let (value, source) = match c.storage_for(collection) {
            Some(resolved) => (resolved.value.to_string(), resolved.source.to_string()),
            None => (
                StorageStrategy::detect(&ctx.root.join(collection.dir_name()))
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unset".to_string()),
                "detected".to_string(),
            ),
        };
        values.push(ConfigValue {
            key: format!("{}-storage", collection),
            value,
            source,
        });
    }
    values.push(ConfigValue {
        key: "index".to_string(),
        value: c
            .index_layout
            .value
            .sections
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        source: c.index_layout.source.to_string(),
    });
    Ok(ConfigShow {
        root: ctx.root.display().to_string(),
        values,
    })
}

// === Action log ===

#[derive(Serialize)]
pub struct LogResult {
    pub count: usize,
    pub entries: Vec<ActionLog>,
}

impl Output for LogResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No actions logged.".to_string();
        }
        self.entries
            .iter()
            .map(|e| {
                let outcome = match &e.error {
                    Some(error) => format!("failed: {}", error),
                    None => "ok".to_string(),
                };
                format!(
                    "{} {} ({} ms) {}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.command,
                    e.duration_ms,
                    outcome
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The last `limit` entries of the action log, oldest first.
pub fn log(root: &Path, limit: usize) -> Result<LogResult> {
    if !root.join(WORKBOOK_DIR).is_dir() {
        return Err(Error::NotInitialized);
    }
    let mut entries = action_log::read_actions(root)?;
    let skip = entries.len().saturating_sub(limit);
    entries.drain(..skip);
    Ok(LogResult {
        count: entries.len(),
        entries,
    })
}
