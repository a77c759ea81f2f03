//! Storage layer for Workbook data.
//!
//! This module handles persistence of task and bug records and keeps each
//! collection's Master Index in step with them.
//!
//! ## Storage Strategies
//!
//! Each collection picks one strategy at `wb init`:
//!
//! - **Files** (default): one `<id>-<slug>.md` file per record
//! - **Journal**: append-only `journal.md`, the latest block per id wins
//!
//! ## Write discipline
//!
//! Every mutation writes the record first and then regenerates the
//! collection's `INDEX.md` from the records. If the record lands but the
//! index does not, the operation fails with `PartialFailure`; re-running
//! [`Store::sync_index`] is the recovery path and is idempotent.

pub mod allocator;
pub mod backend;
pub mod decompose;
pub mod files;
pub mod format;
pub mod index;
pub mod journal;
pub mod linkage;

pub use backend::{Area, RecordBackend, StorageStrategy};

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;

use crate::config::WorkbookConfig;
use crate::config::schema::WORKBOOK_DIR;
use crate::models::graph::{self, DependencyGraph, Readiness};
use crate::models::{
    body, ids, lifecycle, BugSource, Collection, Priority, Record, RecordKind, RecordRef,
    Severity, Status, TaskKind,
};
use crate::{Error, Result};
use index::{IndexDrift, IndexEntry, IndexFilter, IndexLayout, INDEX_FILE};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fields for a new task. The id is always allocated by the store.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub kind: TaskKind,
    /// Defaults to `medium`
    pub priority: Option<Priority>,
    pub parent_id: Option<String>,
    pub dependencies: Vec<String>,
    pub feature: Option<String>,
    pub subsystems: Vec<String>,
    pub estimated_effort: Option<String>,
    pub bug_reference: Option<String>,
    pub body: String,
    pub extra: toml::Table,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Fields for a new bug.
#[derive(Debug, Clone)]
pub struct BugDraft {
    pub title: String,
    pub severity: Severity,
    pub source: BugSource,
    /// Defaults to the severity's fix priority
    pub priority: Option<Priority>,
    pub dependencies: Vec<String>,
    pub feature: Option<String>,
    pub subsystems: Vec<String>,
    pub body: String,
    /// Also create a linked `bug_fix` task
    pub fix_task: bool,
}

impl BugDraft {
    pub fn new(title: impl Into<String>, severity: Severity, source: BugSource) -> Self {
        Self {
            title: title.into(),
            severity,
            source,
            priority: None,
            dependencies: Vec::new(),
            feature: None,
            subsystems: Vec::new(),
            body: String::new(),
            fix_task: true,
        }
    }
}

/// A new bug and the fix task generated for it.
#[derive(Debug, Clone)]
pub struct BugCreated {
    pub bug: Record,
    pub fix_task: Option<Record>,
}

/// Field-level changes. `None` leaves a field alone; an empty string clears
/// an optional text field.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub feature: Option<String>,
    pub subsystems: Option<Vec<String>>,
    pub estimated_effort: Option<String>,
    pub body: Option<String>,
    /// Tasks only
    pub bug_reference: Option<String>,
    /// Bugs only
    pub severity: Option<Severity>,
    /// Bugs only
    pub source: Option<BugSource>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.feature.is_none()
            && self.subsystems.is_none()
            && self.estimated_effort.is_none()
            && self.body.is_none()
            && self.bug_reference.is_none()
            && self.severity.is_none()
            && self.source.is_none()
    }
}

/// Filter for direct record listings.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    /// `kind` header value, e.g. `bug_fix`
    pub kind: Option<String>,
    pub feature: Option<String>,
    /// Direct children of this id
    pub parent: Option<String>,
    pub include_archived: bool,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record, area: Area) -> bool {
        if area == Area::Archive && !self.include_archived {
            return false;
        }
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != record.priority) {
            return false;
        }
        if let Some(kind) = &self.kind {
            if !kind.eq_ignore_ascii_case(record.kind.as_str()) {
                return false;
            }
        }
        if let Some(feature) = &self.feature {
            if record.feature.as_deref() != Some(feature.as_str()) {
                return false;
            }
        }
        match &self.parent {
            Some(parent) => record.parent_id.as_deref() == Some(parent.as_str()),
            None => true,
        }
    }
}

/// Result of a status change.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub record: Record,
    /// Bug closed because this fix task completed
    pub closed_bug: Option<Record>,
}

/// A pending or in-progress record waiting on incomplete dependencies.
#[derive(Debug, Clone)]
pub struct BlockedRecord {
    pub record: Record,
    pub waiting_on: Vec<RecordRef>,
}

/// Outcome of regenerating a Master Index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSyncResult {
    pub collection: Collection,
    pub entries: usize,
    /// Whether the file content changed
    pub changed: bool,
}

/// Storage manager for a workbook root.
pub struct Store {
    root: PathBuf,
    id_width: usize,
    layout: IndexLayout,
    tasks: Box<dyn RecordBackend>,
    bugs: Box<dyn RecordBackend>,
}

impl Store {
    /// Initialize a workbook at `root`. Safe to run on an existing workbook.
    pub fn init(root: &Path, config: &WorkbookConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        fs::create_dir_all(root.join(WORKBOOK_DIR))?;

        let mut backends = Vec::new();
        for collection in Collection::all() {
            let dir = root.join(collection.dir_name());
            let strategy = match (StorageStrategy::detect(&dir), config.storage_for(collection)) {
                (Some(found), Some(wanted)) if found != wanted => {
                    return Err(Error::Config(format!(
                        "{} already use the {} strategy, cannot switch to {}",
                        collection, found, wanted
                    )));
                }
                (Some(found), _) => found,
                (None, wanted) => wanted.unwrap_or_default(),
            };
            let backend = strategy.backend(root, collection);
            backend.init()?;
            tracing::info!(collection = %collection, strategy = %strategy, "initialized collection");
            backends.push(backend);
        }

        let store = Self::assemble(root, config, backends)?;
        for collection in Collection::all() {
            if !store.index_path(collection).exists() {
                store.sync_index(collection)?;
            }
        }
        Ok(store)
    }

    /// Open an initialized workbook.
    pub fn open(root: &Path, config: &WorkbookConfig) -> Result<Self> {
        if !root.join(WORKBOOK_DIR).is_dir() {
            return Err(Error::NotInitialized);
        }
        config.validate().map_err(Error::Config)?;

        let mut backends = Vec::new();
        for collection in Collection::all() {
            let dir = root.join(collection.dir_name());
            let strategy = StorageStrategy::detect(&dir).ok_or(Error::NotInitialized)?;
            if let Some(wanted) = config.storage_for(collection) {
                if wanted != strategy {
                    return Err(Error::Config(format!(
                        "{} are stored with the {} strategy but the config asks for {}",
                        collection, strategy, wanted
                    )));
                }
            }
            backends.push(strategy.backend(root, collection));
        }
        tracing::debug!(root = %root.display(), "opened workbook");
        Self::assemble(root, config, backends)
    }

    fn assemble(
        root: &Path,
        config: &WorkbookConfig,
        backends: Vec<Box<dyn RecordBackend>>,
    ) -> Result<Self> {
        let mut backends = backends.into_iter();
        let (Some(tasks), Some(bugs)) = (backends.next(), backends.next()) else {
            return Err(Error::NotInitialized);
        };
        Ok(Self {
            root: root.to_path_buf(),
            id_width: config.id_width.unwrap_or(ids::DEFAULT_WIDTH),
            layout: config.index_layout()?,
            tasks,
            bugs,
        })
    }

    /// Get the workbook root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    pub fn backend(&self, collection: Collection) -> &dyn RecordBackend {
        match collection {
            Collection::Tasks => self.tasks.as_ref(),
            Collection::Bugs => self.bugs.as_ref(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_backend(&mut self, collection: Collection, backend: Box<dyn RecordBackend>) {
        match collection {
            Collection::Tasks => self.tasks = backend,
            Collection::Bugs => self.bugs = backend,
        }
    }

    pub fn strategy(&self, collection: Collection) -> StorageStrategy {
        self.backend(collection).strategy()
    }

    pub fn index_path(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.dir_name()).join(INDEX_FILE)
    }

    // === Reads ===

    /// Fetch a record and the area it lives in. Active records win.
    pub fn locate(&self, collection: Collection, id: &str) -> Result<(Record, Area)> {
        ids::validate(id)?;
        let backend = self.backend(collection);
        for area in [Area::Active, Area::Archive] {
            if let Some(record) = backend.get(area, id)? {
                tracing::debug!(collection = %collection, id = %id, area = area.as_str(), "fetched record");
                return Ok((record, area));
            }
        }
        Err(Error::NotFound(format!("{} {}", collection.ref_prefix(), id)))
    }

    /// Fetch a record by id, active or archived.
    pub fn get(&self, collection: Collection, id: &str) -> Result<Record> {
        self.locate(collection, id).map(|(record, _)| record)
    }

    fn get_active(&self, collection: Collection, id: &str) -> Result<Record> {
        let (record, area) = self.locate(collection, id)?;
        if area == Area::Archive {
            return Err(Error::Validation(format!(
                "{} {} is archived; restore it first",
                collection.ref_prefix(),
                id
            )));
        }
        Ok(record)
    }

    /// Records of a collection with their area, in id order.
    pub fn records(&self, collection: Collection) -> Result<Vec<(Record, Area)>> {
        let backend = self.backend(collection);
        let mut records: Vec<(Record, Area)> = Vec::new();
        for area in [Area::Active, Area::Archive] {
            records.extend(backend.load(area)?.into_iter().map(|r| (r, area)));
        }
        records.sort_by(|a, b| ids::compare(&a.0.id, &b.0.id));
        Ok(records)
    }

    /// Every record of both collections, active and archived.
    fn all_records(&self) -> Result<Vec<Record>> {
        let mut all = Vec::new();
        for collection in Collection::all() {
            all.extend(self.records(collection)?.into_iter().map(|(r, _)| r));
        }
        Ok(all)
    }

    /// Direct fetch of every matching record.
    pub fn list(&self, collection: Collection, filter: &RecordFilter) -> Result<Vec<Record>> {
        let records: Vec<Record> = self
            .records(collection)?
            .into_iter()
            .filter(|(record, area)| filter.matches(record, *area))
            .map(|(record, _)| record)
            .collect();
        tracing::debug!(collection = %collection, count = records.len(), "listed records");
        Ok(records)
    }

    /// Collection scan over the Master Index, without opening records.
    pub fn query(&self, collection: Collection, filter: &IndexFilter) -> Result<Vec<IndexEntry>> {
        let path = self.index_path(collection);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "{} (run `wb index sync`)",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let parsed = index::parse(&text, &self.layout);
        if !parsed.malformed.is_empty() {
            tracing::warn!(
                collection = %collection,
                malformed = parsed.malformed.len(),
                "index has malformed lines"
            );
        }
        Ok(parsed
            .entries
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect())
    }

    /// Status of every record, keyed by reference.
    fn status_map(&self) -> Result<HashMap<RecordRef, Status>> {
        Ok(self
            .all_records()?
            .into_iter()
            .map(|r| (r.reference(), r.status))
            .collect())
    }

    /// Advisory readiness of one record.
    pub fn is_ready(&self, collection: Collection, id: &str) -> Result<Readiness> {
        let record = self.get(collection, id)?;
        let statuses = self.status_map()?;
        graph::readiness(&record, |r| statuses.get(r).copied())
    }

    /// Pending active records whose dependencies are all completed.
    pub fn ready(&self, collection: Collection) -> Result<Vec<Record>> {
        let statuses = self.status_map()?;
        let mut ready = Vec::new();
        for record in self.backend(collection).load(Area::Active)? {
            if record.status != Status::Pending {
                continue;
            }
            if graph::readiness(&record, |r| statuses.get(r).copied())?.ready {
                ready.push(record);
            }
        }
        Ok(ready)
    }

    /// Open active records waiting on at least one incomplete dependency.
    pub fn blocked(&self, collection: Collection) -> Result<Vec<BlockedRecord>> {
        let statuses = self.status_map()?;
        let mut blocked = Vec::new();
        for record in self.backend(collection).load(Area::Active)? {
            if record.status.is_terminal() {
                continue;
            }
            let readiness = graph::readiness(&record, |r| statuses.get(r).copied())?;
            if !readiness.ready {
                blocked.push(BlockedRecord {
                    record,
                    waiting_on: readiness.waiting_on,
                });
            }
        }
        Ok(blocked)
    }

    // === Creation ===

    /// Create a task under a freshly allocated id.
    pub fn create_task(&self, draft: TaskDraft) -> Result<Record> {
        let backend = self.backend(Collection::Tasks);
        let id = match &draft.parent_id {
            Some(parent) => {
                self.get_active(Collection::Tasks, parent)?;
                allocator::allocate_child(backend, parent)?
            }
            None => allocator::allocate_top_level(backend, self.id_width)?,
        };

        let mut record = Record::task(id, draft.title.trim(), draft.kind);
        record.priority = draft.priority.unwrap_or_default();
        record.parent_id = draft.parent_id;
        record.feature = non_empty(draft.feature);
        record.subsystems = clean_list(draft.subsystems);
        record.estimated_effort = non_empty(draft.estimated_effort);
        record.extra = draft.extra;
        record.body = draft.body;
        if let Some(bug) = non_empty(draft.bug_reference) {
            self.check_bug_reference(&bug)?;
            record.kind = RecordKind::Task {
                kind: draft.kind,
                bug_reference: Some(bug),
            };
        }
        record.dependencies = self.checked_dependencies(&record, draft.dependencies)?;

        self.insert(record)
    }

    /// Create a bug, and its linked fix task unless the draft opts out.
    pub fn create_bug(&self, draft: BugDraft) -> Result<BugCreated> {
        let id = allocator::allocate_top_level(self.backend(Collection::Bugs), self.id_width)?;
        let mut bug = Record::bug(id, draft.title.trim(), draft.severity, draft.source);
        bug.priority = draft.priority.unwrap_or(draft.severity.fix_priority());
        bug.feature = non_empty(draft.feature.clone());
        bug.subsystems = clean_list(draft.subsystems.clone());
        bug.body = draft.body;
        bug.dependencies = self.checked_dependencies(&bug, draft.dependencies)?;
        let bug = self.insert(bug)?;

        if !draft.fix_task {
            return Ok(BugCreated { bug, fix_task: None });
        }

        let fix = TaskDraft {
            title: format!("Fix: {}", bug.title),
            kind: TaskKind::BugFix,
            priority: Some(draft.severity.fix_priority()),
            feature: draft.feature,
            subsystems: draft.subsystems,
            bug_reference: Some(bug.id.clone()),
            body: body::compose(
                Some(format!("Resolve bug {} ({} severity).", bug.id, draft.severity).as_str()),
                &[format!("Bug {} no longer reproduces", bug.id)],
            ),
            ..Default::default()
        };
        match self.create_task(fix) {
            Ok(task) => {
                tracing::info!(bug = %bug.id, task = %task.id, "linked fix task");
                Ok(BugCreated {
                    bug,
                    fix_task: Some(task),
                })
            }
            Err(e) => {
                tracing::warn!(bug = %bug.id, error = %e, "bug recorded without its fix task");
                Err(Error::PartialFailure {
                    collection: Collection::Bugs,
                    recovery: format!(
                        "create the fix task manually with `wb task create --bug {} -k bug_fix`",
                        bug.id
                    ),
                    ids: vec![bug.id],
                    detail: format!("fix task was not created: {}", e),
                })
            }
        }
    }

    /// Import caller-identified records after validating the whole batch.
    ///
    /// Nothing is written unless every record passes.
    pub fn import(&self, collection: Collection, records: Vec<Record>) -> Result<Vec<String>> {
        let existing: BTreeSet<String> = self.backend(collection).ids()?.into_iter().collect();
        let mut batch_ids = BTreeSet::new();
        for record in &records {
            if record.collection() != collection {
                return Err(Error::Validation(format!(
                    "{} record {} cannot be imported into {}",
                    record.kind.as_str(),
                    record.id,
                    collection
                )));
            }
            format::validate(record)?;
            if !batch_ids.insert(record.id.clone()) {
                return Err(Error::Validation(format!("duplicate id {} in batch", record.id)));
            }
            if existing.contains(&record.id) {
                return Err(Error::Validation(format!(
                    "{} {} already exists",
                    collection.ref_prefix(),
                    record.id
                )));
            }
            if ids::implied_parent(&record.id) != record.parent_id.as_deref() {
                return Err(Error::Validation(format!(
                    "id {} does not match parent {}",
                    record.id,
                    record.parent_id.as_deref().unwrap_or("(none)")
                )));
            }
        }

        let mut all = self.all_records()?;
        let mut known: BTreeSet<RecordRef> = all.iter().map(Record::reference).collect();
        known.extend(records.iter().map(Record::reference));
        for record in &records {
            if let Some(parent) = &record.parent_id {
                if !known.contains(&RecordRef::new(collection, parent.clone())) {
                    return Err(Error::NotFound(format!(
                        "parent {} of {}",
                        parent, record.id
                    )));
                }
            }
            for dep in record.dependency_refs()? {
                if !known.contains(&dep) {
                    return Err(Error::NotFound(format!("dependency {} of {}", dep, record.id)));
                }
            }
            if let Some(bug) = record.bug_reference() {
                if !known.contains(&RecordRef::new(Collection::Bugs, bug)) {
                    return Err(Error::NotFound(format!("bug {} of {}", bug, record.id)));
                }
            }
        }
        all.extend(records.iter().cloned());
        DependencyGraph::from_records(&all)?.ensure_acyclic()?;

        let mut records = records;
        records.sort_by(|a, b| ids::compare(&a.id, &b.id));
        let mut written = Vec::new();
        for record in &records {
            if let Err(e) = allocator::claim(self.backend(collection), record) {
                return Err(self.batch_failed(
                    collection,
                    written,
                    e,
                    "the listed records were imported; import the rest again".to_string(),
                ));
            }
            written.push(record.id.clone());
        }
        self.refresh_index(collection, &written)?;
        tracing::info!(collection = %collection, count = written.len(), "imported records");
        Ok(written)
    }

    /// Claim a new record's id, then refresh the index.
    fn insert(&self, record: Record) -> Result<Record> {
        let collection = record.collection();
        if let Err(e) = allocator::claim(self.backend(collection), &record) {
            if matches!(e, Error::Conflict { .. }) {
                // Both claims stay on disk; list them both.
                self.resync(collection);
            }
            return Err(e);
        }
        self.refresh_index(collection, &[record.id.clone()])?;
        tracing::info!(collection = %collection, id = %record.id, title = %record.title, "created record");
        Ok(record)
    }

    fn check_bug_reference(&self, bug: &str) -> Result<()> {
        self.get(Collection::Bugs, bug).map(|_| ()).map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("bug_reference {}", bug)),
            other => other,
        })
    }

    /// Normalize requested dependencies and check they exist and stay acyclic.
    fn checked_dependencies(&self, record: &Record, requested: Vec<String>) -> Result<Vec<String>> {
        let home = record.collection();
        let me = record.reference();
        let mut refs: Vec<RecordRef> = Vec::new();
        for dep in requested.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
            let dep = RecordRef::parse(dep, home)?;
            if dep == me {
                return Err(Error::Validation(format!("{} cannot depend on itself", me)));
            }
            if !refs.contains(&dep) {
                refs.push(dep);
            }
        }

        let mut all = self.all_records()?;
        for dep in &refs {
            if !all.iter().any(|r| r.reference() == *dep) {
                return Err(Error::NotFound(format!("dependency {}", dep)));
            }
        }

        let mut candidate = record.clone();
        candidate.dependencies = refs.iter().map(|r| r.to_reference(home)).collect();
        all.retain(|r| r.reference() != me);
        all.push(candidate.clone());
        DependencyGraph::from_records(&all)?.ensure_acyclic()?;
        Ok(candidate.dependencies)
    }

    // === Mutation ===

    /// Persist a changed active record, then refresh the index.
    fn commit(&self, record: &Record) -> Result<()> {
        let collection = record.collection();
        self.backend(collection).save(record)?;
        self.refresh_index(collection, &[record.id.clone()])
    }

    /// Apply field-level changes to an active record.
    pub fn update(&self, collection: Collection, id: &str, update: RecordUpdate) -> Result<Record> {
        if update.is_empty() {
            return Err(Error::InvalidInput("nothing to update".to_string()));
        }
        let mut record = self.get_active(collection, id)?;

        if let Some(title) = update.title {
            record.title = title.trim().to_string();
        }
        if let Some(priority) = update.priority {
            record.priority = priority;
        }
        if let Some(feature) = update.feature {
            record.feature = non_empty(Some(feature));
        }
        if let Some(subsystems) = update.subsystems {
            record.subsystems = clean_list(subsystems);
        }
        if let Some(effort) = update.estimated_effort {
            record.estimated_effort = non_empty(Some(effort));
        }
        if let Some(text) = update.body {
            record.body = text;
        }

        match &mut record.kind {
            RecordKind::Task { bug_reference, .. } => {
                if update.severity.is_some() || update.source.is_some() {
                    return Err(Error::Validation(
                        "severity and source apply to bugs only".to_string(),
                    ));
                }
                if let Some(bug) = update.bug_reference {
                    *bug_reference = non_empty(Some(bug));
                }
            }
            RecordKind::Bug {
                severity, source, ..
            } => {
                if update.bug_reference.is_some() {
                    return Err(Error::Validation(
                        "bug_reference applies to tasks only".to_string(),
                    ));
                }
                if let Some(s) = update.severity {
                    *severity = s;
                }
                if let Some(s) = update.source {
                    *source = s;
                }
            }
        }
        if let Some(bug) = record.bug_reference() {
            self.check_bug_reference(bug)?;
        }

        format::validate(&record)?;
        self.commit(&record)?;
        tracing::info!(collection = %collection, id = %id, "updated record");
        Ok(record)
    }

    /// Replace a record's dependencies after existence and cycle checks.
    pub fn set_dependencies(
        &self,
        collection: Collection,
        id: &str,
        dependencies: Vec<String>,
    ) -> Result<Record> {
        let mut record = self.get_active(collection, id)?;
        record.dependencies = self.checked_dependencies(&record, dependencies)?;
        self.commit(&record)?;
        tracing::info!(
            collection = %collection,
            id = %id,
            dependencies = ?record.dependencies,
            "set dependencies"
        );
        Ok(record)
    }

    /// Add one dependency (`dep` may be qualified, e.g. `bug:0003`).
    pub fn add_dependency(&self, collection: Collection, id: &str, dep: &str) -> Result<Record> {
        let record = self.get_active(collection, id)?;
        let dep_ref = RecordRef::parse(dep, collection)?;
        if record.dependency_refs()?.contains(&dep_ref) {
            return Err(Error::Validation(format!(
                "Dependency already exists: {} -> {}",
                record.reference(),
                dep_ref
            )));
        }
        let mut deps = record.dependencies.clone();
        deps.push(dep_ref.to_reference(collection));
        self.set_dependencies(collection, id, deps)
    }

    /// Remove one dependency.
    pub fn remove_dependency(&self, collection: Collection, id: &str, dep: &str) -> Result<Record> {
        let mut record = self.get_active(collection, id)?;
        let dep_ref = RecordRef::parse(dep, collection)?;
        let before = record.dependencies.len();
        record
            .dependencies
            .retain(|d| RecordRef::parse(d, collection).ok().as_ref() != Some(&dep_ref));
        if record.dependencies.len() == before {
            return Err(Error::NotFound(format!(
                "Dependency not found: {} -> {}",
                record.reference(),
                dep_ref
            )));
        }
        self.commit(&record)?;
        tracing::info!(collection = %collection, id = %id, removed = %dep_ref, "removed dependency");
        Ok(record)
    }

    /// Move a record along the state machine.
    ///
    /// Completing a `bug_fix` task closes its bug as fixed.
    pub fn transition(
        &self,
        collection: Collection,
        id: &str,
        to: Status,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let mut record = self.get_active(collection, id)?;
        if matches!(record.kind, RecordKind::Bug { .. }) && to == Status::Completed {
            return Err(Error::Validation(format!(
                "bug {} closes when its fix task completes, or with `wb bug close`",
                id
            )));
        }
        let from = record.status;
        lifecycle::apply(&mut record, to, reason, Utc::now())?;
        self.commit(&record)?;
        tracing::info!(collection = %collection, id = %id, from = %from, to = %to, "transitioned record");

        let mut closed_bug = None;
        if to == Status::Completed && record.is_bug_fix() {
            if let Some(bug) = record.bug_reference() {
                closed_bug = self.close_fixed_bug(bug, &record.id)?;
            }
        }
        Ok(TransitionOutcome { record, closed_bug })
    }

    /// Explicitly complete a parent whose direct children are all completed.
    pub fn complete_group(&self, collection: Collection, parent: &str) -> Result<Record> {
        let mut record = self.get_active(collection, parent)?;
        let children: Vec<Record> = self
            .records(collection)?
            .into_iter()
            .map(|(r, _)| r)
            .filter(|r| r.parent_id.as_deref() == Some(parent))
            .collect();
        if children.is_empty() {
            return Err(Error::Validation(format!("{} has no children", parent)));
        }
        let open: Vec<String> = children
            .iter()
            .filter(|c| c.status != Status::Completed)
            .map(|c| format!("{} ({})", c.id, c.status))
            .collect();
        if !open.is_empty() {
            return Err(Error::Validation(format!(
                "{} has children that are not completed: {}",
                parent,
                open.join(", ")
            )));
        }

        let now = Utc::now();
        if record.status == Status::Pending {
            lifecycle::apply(&mut record, Status::InProgress, None, now)?;
        }
        lifecycle::apply(&mut record, Status::Completed, None, now)?;
        self.commit(&record)?;
        tracing::info!(collection = %collection, id = %parent, children = children.len(), "completed group");
        Ok(record)
    }

    /// Move a terminal record to the archive. Its id stays taken.
    pub fn archive(&self, collection: Collection, id: &str) -> Result<Record> {
        let record = self.get_active(collection, id)?;
        if !record.status.is_terminal() {
            return Err(Error::Validation(format!(
                "only completed or failed records can be archived; {} is {}",
                id,
                record.status_label()
            )));
        }
        self.backend(collection)
            .relocate(id, Area::Active, Area::Archive)?;
        self.refresh_index(collection, &[id.to_string()])?;
        tracing::info!(collection = %collection, id = %id, "archived record");
        Ok(record)
    }

    /// Bring an archived record back to the active store.
    pub fn restore(&self, collection: Collection, id: &str) -> Result<Record> {
        let (record, area) = self.locate(collection, id)?;
        if area != Area::Archive {
            return Err(Error::Validation(format!("{} {} is not archived", collection.ref_prefix(), id)));
        }
        self.backend(collection)
            .relocate(id, Area::Archive, Area::Active)?;
        self.refresh_index(collection, &[id.to_string()])?;
        tracing::info!(collection = %collection, id = %id, "restored record");
        Ok(record)
    }

    // === Master Index ===

    /// Index entries implied by the records, duplicates included.
    pub fn expected_entries(&self, collection: Collection) -> Result<Vec<IndexEntry>> {
        Ok(self
            .records(collection)?
            .iter()
            .map(|(record, area)| {
                IndexEntry::from_record(record, *area == Area::Archive, &self.layout)
            })
            .collect())
    }

    /// Regenerate a collection's Master Index from its records.
    pub fn sync_index(&self, collection: Collection) -> Result<IndexSyncResult> {
        let entries = self.expected_entries(collection)?;
        let text = index::render(collection, &self.layout, &entries);
        let path = self.index_path(collection);
        let changed = match fs::read_to_string(&path) {
            Ok(current) => current != text,
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };
        if changed {
            write_replace(&path, &text)?;
            tracing::debug!(collection = %collection, entries = entries.len(), "wrote index");
        }
        Ok(IndexSyncResult {
            collection,
            entries: entries.len(),
            changed,
        })
    }

    /// Compare the Master Index with the records without changing anything.
    pub fn verify_index(&self, collection: Collection) -> Result<IndexDrift> {
        let expected = self.expected_entries(collection)?;
        let text = match fs::read_to_string(self.index_path(collection)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let drift = index::verify(&expected, &index::parse(&text, &self.layout));
        if !drift.is_clean() {
            tracing::warn!(
                collection = %collection,
                missing = drift.missing.len(),
                orphaned = drift.orphaned.len(),
                duplicated = drift.duplicated.len(),
                mismatched = drift.mismatched.len(),
                "index drift"
            );
        }
        Ok(drift)
    }

    /// Best-effort index rebuild after a failed write. Returns whether it landed.
    fn resync(&self, collection: Collection) -> bool {
        match self.sync_index(collection) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "index not refreshed after failed write");
                false
            }
        }
    }

    /// A claim failed partway through a batch. With nothing written the
    /// cause is returned as is; otherwise the ids on disk are reported.
    pub(crate) fn batch_failed(
        &self,
        collection: Collection,
        written: Vec<String>,
        cause: Error,
        recovery: String,
    ) -> Error {
        let synced = self.resync(collection);
        if written.is_empty() {
            return cause;
        }
        tracing::warn!(collection = %collection, written = ?written, error = %cause, "batch stopped partway");
        Error::PartialFailure {
            collection,
            ids: written,
            detail: cause.to_string(),
            recovery: if synced {
                recovery
            } else {
                format!("{}, then {}", recovery, crate::INDEX_SYNC_HINT)
            },
        }
    }

    /// Refresh the index after a record write; a failure here is partial.
    fn refresh_index(&self, collection: Collection, ids: &[String]) -> Result<()> {
        self.sync_index(collection).map(|_| ()).map_err(|e| {
            tracing::warn!(collection = %collection, ids = ?ids, error = %e, "record written but index not refreshed");
            Error::PartialFailure {
                collection,
                ids: ids.to_vec(),
                detail: e.to_string(),
                recovery: crate::INDEX_SYNC_HINT.to_string(),
            }
        })
    }
}

/// Replace a file through a sibling temp file and a rename.
fn write_replace(path: &Path, text: &str) -> Result<()> {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("md.{}.{}.tmp", std::process::id(), seq));
    fs::write(&tmp, text)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if !out.iter().any(|o| o == value) {
            out.push(value.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Closure;
    use crate::test_utils::{RivalWriter, TestEnv};

    fn task(store: &Store, title: &str) -> Record {
        store.create_task(TaskDraft::new(title)).unwrap()
    }

    fn index_text(store: &Store, collection: Collection) -> String {
        fs::read_to_string(store.index_path(collection)).unwrap()
    }

    #[test]
    fn test_init_creates_layout() {
        let env = TestEnv::new();
        let store = env.init_store();

        assert!(env.path().join(".workbook").is_dir());
        assert!(env.path().join("tasks/items").is_dir());
        assert!(env.path().join("bugs/archive").is_dir());
        assert!(index_text(&store, Collection::Tasks).starts_with("# Tasks"));
        assert!(index_text(&store, Collection::Bugs).starts_with("# Bugs"));
    }

    #[test]
    fn test_open_uninitialized() {
        let env = TestEnv::new();
        let result = Store::open(env.path(), &WorkbookConfig::default());
        assert!(matches!(result, Err(Error::NotInitialized)));
    }

    #[test]
    fn test_open_detects_strategy() {
        let env = TestEnv::new();
        env.init_store_with(StorageStrategy::Journal);
        let store = env.open_store();
        assert_eq!(store.strategy(Collection::Tasks), StorageStrategy::Journal);

        let mut config = WorkbookConfig::default();
        config.bugs_storage = Some(StorageStrategy::Files);
        assert!(matches!(
            Store::open(env.path(), &config),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Store::init(env.path(), &config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_create_task_allocates_sequential_ids() {
        let env = TestEnv::new();
        let store = env.init_store();
        assert_eq!(task(&store, "First").id, "0001");
        assert_eq!(task(&store, "Second").id, "0002");

        let child = store
            .create_task(TaskDraft {
                parent_id: Some("0001".to_string()),
                ..TaskDraft::new("Child")
            })
            .unwrap();
        assert_eq!(child.id, "0001.1");
        assert_eq!(child.parent_id.as_deref(), Some("0001"));
        assert!(index_text(&store, Collection::Tasks).contains("- [ ] TASK 0001.1 (medium) Child"));
    }

    #[test]
    fn test_create_task_with_missing_parent() {
        let env = TestEnv::new();
        let store = env.init_store();
        let err = store
            .create_task(TaskDraft {
                parent_id: Some("0042".to_string()),
                ..TaskDraft::new("Orphan")
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.list(Collection::Tasks, &RecordFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_create_task_rejects_missing_dependency_without_writing() {
        let env = TestEnv::new();
        let store = env.init_store();
        let err = store
            .create_task(TaskDraft {
                dependencies: vec!["0009".to_string()],
                ..TaskDraft::new("Depends on nothing real")
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.backend(Collection::Tasks).ids().unwrap().is_empty());
    }

    #[test]
    fn test_create_task_rejects_unknown_bug_reference() {
        let env = TestEnv::new();
        let store = env.init_store();
        let err = store
            .create_task(TaskDraft {
                kind: TaskKind::BugFix,
                bug_reference: Some("0001".to_string()),
                ..TaskDraft::new("Fix nothing")
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_dependency_cycle_is_rejected() {
        let env = TestEnv::new();
        let store = env.init_store();
        let a = task(&store, "A");
        let b = task(&store, "B");
        store.add_dependency(Collection::Tasks, &b.id, &a.id).unwrap();

        let err = store.add_dependency(Collection::Tasks, &a.id, &b.id).unwrap_err();
        match err {
            Error::CyclicDependency { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"task:0001".to_string()));
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(store.get(Collection::Tasks, &a.id).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_self_and_duplicate_dependency() {
        let env = TestEnv::new();
        let store = env.init_store();
        let a = task(&store, "A");
        let b = task(&store, "B");
        assert!(matches!(
            store.add_dependency(Collection::Tasks, &a.id, &a.id),
            Err(Error::Validation(_))
        ));
        store.add_dependency(Collection::Tasks, &a.id, &b.id).unwrap();
        assert!(matches!(
            store.add_dependency(Collection::Tasks, &a.id, &b.id),
            Err(Error::Validation(_))
        ));
        store.remove_dependency(Collection::Tasks, &a.id, &b.id).unwrap();
        assert!(matches!(
            store.remove_dependency(Collection::Tasks, &a.id, &b.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_cross_collection_dependency_and_readiness() {
        let env = TestEnv::new();
        let store = env.init_store();
        let mut draft = BugDraft::new("Crash", Severity::Low, BugSource::Testing);
        draft.fix_task = false;
        let bug = store.create_bug(draft).unwrap().bug;
        let t = task(&store, "Needs the bug gone");
        store
            .add_dependency(Collection::Tasks, &t.id, &format!("bug:{}", bug.id))
            .unwrap();

        let readiness = store.is_ready(Collection::Tasks, &t.id).unwrap();
        assert!(!readiness.ready);
        assert_eq!(readiness.waiting_on, vec![RecordRef::new(Collection::Bugs, "0001")]);
        assert!(store.ready(Collection::Tasks).unwrap().is_empty());
        assert_eq!(store.blocked(Collection::Tasks).unwrap().len(), 1);

        store
            .close_bug(&bug.id, "duplicate of an upstream issue")
            .unwrap();
        assert!(store.is_ready(Collection::Tasks, &t.id).unwrap().ready);
        assert_eq!(store.ready(Collection::Tasks).unwrap().len(), 1);
    }

    #[test]
    fn test_transition_updates_index_glyph() {
        let env = TestEnv::new();
        let store = env.init_store();
        let t = task(&store, "Ship it");
        store
            .transition(Collection::Tasks, &t.id, Status::InProgress, None)
            .unwrap();
        assert!(index_text(&store, Collection::Tasks).contains("- [>] TASK 0001 (medium) Ship it"));

        let outcome = store
            .transition(Collection::Tasks, &t.id, Status::Completed, None)
            .unwrap();
        assert!(outcome.record.completed_at.is_some());
        assert!(outcome.closed_bug.is_none());
        assert!(index_text(&store, Collection::Tasks).contains("- [x] TASK 0001 (medium) Ship it"));

        let err = store
            .transition(Collection::Tasks, &t.id, Status::InProgress, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: Status::Completed,
                to: Status::InProgress
            }
        ));
    }

    #[test]
    fn test_bug_cannot_complete_directly() {
        let env = TestEnv::new();
        let store = env.init_store();
        let created = store
            .create_bug(BugDraft::new("Crash", Severity::High, BugSource::Production))
            .unwrap();
        store
            .transition(Collection::Bugs, &created.bug.id, Status::InProgress, None)
            .unwrap();
        assert!(matches!(
            store.transition(Collection::Bugs, &created.bug.id, Status::Completed, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_completing_fix_task_closes_bug() {
        let env = TestEnv::new();
        let store = env.init_store();
        let created = store
            .create_bug(BugDraft::new("Crash on save", Severity::Critical, BugSource::Production))
            .unwrap();
        let fix = created.fix_task.unwrap();
        assert_eq!(fix.priority, Priority::Critical);
        assert_eq!(fix.bug_reference(), Some(created.bug.id.as_str()));

        store
            .transition(Collection::Tasks, &fix.id, Status::InProgress, None)
            .unwrap();
        let outcome = store
            .transition(Collection::Tasks, &fix.id, Status::Completed, None)
            .unwrap();
        let bug = outcome.closed_bug.unwrap();
        assert_eq!(bug.status_label(), "closed");
        match &bug.kind {
            RecordKind::Bug { closure, .. } => assert_eq!(
                closure,
                &Some(Closure::Fixed {
                    task_id: fix.id.clone()
                })
            ),
            other => panic!("expected bug, got {:?}", other),
        }
        assert!(index_text(&store, Collection::Bugs).contains("- [x] BUG 0001 (critical) Crash on save"));
    }

    #[test]
    fn test_update_fields() {
        let env = TestEnv::new();
        let store = env.init_store();
        let t = task(&store, "Old title");
        let updated = store
            .update(
                Collection::Tasks,
                &t.id,
                RecordUpdate {
                    title: Some("New title".to_string()),
                    priority: Some(Priority::High),
                    subsystems: Some(vec!["cli".to_string(), "cli".to_string(), " ".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.subsystems, vec!["cli".to_string()]);
        assert_eq!(store.get(Collection::Tasks, &t.id).unwrap(), updated);
        assert!(index_text(&store, Collection::Tasks).contains("(high) New title"));

        assert!(matches!(
            store.update(Collection::Tasks, &t.id, RecordUpdate::default()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.update(
                Collection::Tasks,
                &t.id,
                RecordUpdate {
                    severity: Some(Severity::Low),
                    ..Default::default()
                }
            ),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_archive_and_restore() {
        let env = TestEnv::new();
        let store = env.init_store();
        let t = task(&store, "Done soon");
        assert!(matches!(
            store.archive(Collection::Tasks, &t.id),
            Err(Error::Validation(_))
        ));

        store
            .transition(Collection::Tasks, &t.id, Status::InProgress, None)
            .unwrap();
        store
            .transition(Collection::Tasks, &t.id, Status::Failed, Some("dropped"))
            .unwrap();
        store.archive(Collection::Tasks, &t.id).unwrap();

        let (_, area) = store.locate(Collection::Tasks, &t.id).unwrap();
        assert_eq!(area, Area::Archive);
        assert!(index_text(&store, Collection::Tasks).contains("## Archived\n\n- [!] TASK 0001"));
        assert!(matches!(
            store.transition(Collection::Tasks, &t.id, Status::Pending, None),
            Err(Error::Validation(_))
        ));

        // Archived ids are never reused.
        assert_eq!(task(&store, "Next").id, "0002");

        store.restore(Collection::Tasks, &t.id).unwrap();
        store
            .transition(Collection::Tasks, &t.id, Status::Pending, None)
            .unwrap();
        assert!(store.verify_index(Collection::Tasks).unwrap().is_clean());
    }

    #[test]
    fn test_query_reads_index() {
        let env = TestEnv::new();
        let store = env.init_store();
        task(&store, "Low one");
        store
            .create_task(TaskDraft {
                priority: Some(Priority::High),
                ..TaskDraft::new("High one")
            })
            .unwrap();

        let filter = IndexFilter {
            priority: Some(Priority::High),
            ..Default::default()
        };
        let entries = store.query(Collection::Tasks, &filter).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "High one");
        assert_eq!(entries[0].section, "Pending");
    }

    #[test]
    fn test_index_sync_recovers_and_is_idempotent() {
        let env = TestEnv::new();
        let store = env.init_store();
        task(&store, "One");
        task(&store, "Two");
        fs::write(store.index_path(Collection::Tasks), "# Tasks\n\n- [ ] TASK 0009 (low) Ghost\n").unwrap();

        let drift = store.verify_index(Collection::Tasks).unwrap();
        assert_eq!(drift.missing, vec!["0001".to_string(), "0002".to_string()]);
        assert_eq!(drift.orphaned, vec!["0009".to_string()]);

        let first = store.sync_index(Collection::Tasks).unwrap();
        assert!(first.changed);
        assert_eq!(first.entries, 2);
        let second = store.sync_index(Collection::Tasks).unwrap();
        assert!(!second.changed);
        assert!(store.verify_index(Collection::Tasks).unwrap().is_clean());
    }

    #[test]
    fn test_index_write_failure_is_partial() {
        let env = TestEnv::new();
        let store = env.init_store();
        // A directory where the index file should be makes the write fail.
        let path = store.index_path(Collection::Tasks);
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let err = store.create_task(TaskDraft::new("Lands anyway")).unwrap_err();
        match err {
            Error::PartialFailure {
                collection,
                ids,
                recovery,
                ..
            } => {
                assert_eq!(collection, Collection::Tasks);
                assert_eq!(ids, vec!["0001".to_string()]);
                assert_eq!(recovery, crate::INDEX_SYNC_HINT);
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        assert!(store.get(Collection::Tasks, "0001").is_ok());

        fs::remove_dir(&path).unwrap();
        store.sync_index(Collection::Tasks).unwrap();
        assert!(store.verify_index(Collection::Tasks).unwrap().is_clean());
    }

    #[test]
    fn test_complete_group_is_explicit() {
        let env = TestEnv::new();
        let store = env.init_store();
        let parent = task(&store, "Parent");
        assert!(matches!(
            store.complete_group(Collection::Tasks, &parent.id),
            Err(Error::Validation(_))
        ));

        let child = store
            .create_task(TaskDraft {
                parent_id: Some(parent.id.clone()),
                ..TaskDraft::new("Only child")
            })
            .unwrap();
        assert!(matches!(
            store.complete_group(Collection::Tasks, &parent.id),
            Err(Error::Validation(_))
        ));

        store
            .transition(Collection::Tasks, &child.id, Status::InProgress, None)
            .unwrap();
        store
            .transition(Collection::Tasks, &child.id, Status::Completed, None)
            .unwrap();
        // Children completing never completes the parent on its own.
        assert_eq!(store.get(Collection::Tasks, &parent.id).unwrap().status, Status::Pending);

        let done = store.complete_group(Collection::Tasks, &parent.id).unwrap();
        assert_eq!(done.status, Status::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_import_validates_whole_batch() {
        let env = TestEnv::new();
        let store = env.init_store();

        let mut a = Record::task("0001", "A", TaskKind::Task);
        let mut b = Record::task("0002", "B", TaskKind::Task);
        let mut c = Record::task("0003", "C", TaskKind::Task);
        a.dependencies = vec!["0002".to_string()];
        b.dependencies = vec!["0003".to_string()];
        c.dependencies = vec!["0001".to_string()];
        let err = store
            .import(Collection::Tasks, vec![a.clone(), b.clone(), c.clone()])
            .unwrap_err();
        assert!(matches!(err, Error::CyclicDependency { .. }));
        assert!(store.backend(Collection::Tasks).ids().unwrap().is_empty());

        c.dependencies.clear();
        let written = store.import(Collection::Tasks, vec![c, b, a]).unwrap();
        assert_eq!(written, vec!["0001", "0002", "0003"]);
        assert!(store.verify_index(Collection::Tasks).unwrap().is_clean());
        assert_eq!(task(&store, "After import").id, "0004");
    }

    #[test]
    fn test_import_claim_lost_partway_reports_imported() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        RivalWriter::install(&mut store, env.path(), "0003");

        let batch = (1..=4)
            .map(|n| Record::task(format!("000{}", n), format!("R{}", n), TaskKind::Task))
            .collect();
        let err = store.import(Collection::Tasks, batch).unwrap_err();
        match &err {
            Error::PartialFailure { ids, detail, recovery, .. } => {
                assert_eq!(ids, &vec!["0001".to_string(), "0002".to_string()]);
                assert!(detail.contains("0003"));
                assert!(recovery.contains("import the rest"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        assert!(!err.to_string().contains("wb index sync"));

        let ids = store.backend(Collection::Tasks).ids().unwrap();
        assert_eq!(ids, vec!["0001", "0002", "0003"]);
        assert_eq!(index_text(&store, Collection::Tasks).matches("TASK 0003").count(), 2);
    }

    #[test]
    fn test_import_first_claim_lost_is_plain_conflict() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        RivalWriter::install(&mut store, env.path(), "0001");

        let batch = vec![
            Record::task("0001", "A", TaskKind::Task),
            Record::task("0002", "B", TaskKind::Task),
        ];
        assert!(matches!(
            store.import(Collection::Tasks, batch),
            Err(Error::Conflict { .. })
        ));
        assert_eq!(store.backend(Collection::Tasks).ids().unwrap(), vec!["0001"]);
    }

    #[test]
    fn test_exhausted_id_space_fails_without_panicking() {
        let env = TestEnv::new();
        let store = env.init_store();
        let last = Record::task("18446744073709551615", "Last", TaskKind::Task);
        store.import(Collection::Tasks, vec![last]).unwrap();

        assert!(matches!(
            store.create_task(TaskDraft::new("One more")),
            Err(Error::Validation(_))
        ));
        assert_eq!(store.backend(Collection::Tasks).ids().unwrap().len(), 1);

        let too_big = Record::task("18446744073709551616", "Too big", TaskKind::Task);
        assert!(matches!(
            store.import(Collection::Tasks, vec![too_big]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_fix_task_failure_says_how_to_recover() {
        let env = TestEnv::new();
        let mut store = env.init_store();
        RivalWriter::install(&mut store, env.path(), "0001");

        let err = store
            .create_bug(BugDraft::new("Crash", Severity::High, BugSource::Testing))
            .unwrap_err();
        match &err {
            Error::PartialFailure { collection, ids, recovery, .. } => {
                assert_eq!(*collection, Collection::Bugs);
                assert_eq!(ids, &vec!["0001".to_string()]);
                assert!(recovery.contains("wb task create --bug 0001 -k bug_fix"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        assert!(!err.to_string().contains("wb index sync"));
        assert!(store.get(Collection::Bugs, "0001").is_ok());
    }

    #[test]
    fn test_import_rejects_mismatched_parent() {
        let env = TestEnv::new();
        let store = env.init_store();
        let parent = Record::task("0001", "P", TaskKind::Task);
        let mut child = Record::task("0001.1", "C", TaskKind::Task);
        assert!(matches!(
            store.import(Collection::Tasks, vec![parent.clone(), child.clone()]),
            Err(Error::Validation(_))
        ));
        child.parent_id = Some("0001".to_string());
        store.import(Collection::Tasks, vec![parent, child]).unwrap();
    }

    #[test]
    fn test_journal_store_round_trip() {
        let env = TestEnv::new();
        let store = env.init_store_with(StorageStrategy::Journal);
        let t = task(&store, "Journaled");
        store
            .transition(Collection::Tasks, &t.id, Status::InProgress, None)
            .unwrap();
        let reopened = env.open_store();
        assert_eq!(
            reopened.get(Collection::Tasks, &t.id).unwrap().status,
            Status::InProgress
        );
        assert!(reopened.verify_index(Collection::Tasks).unwrap().is_clean());
    }
}
