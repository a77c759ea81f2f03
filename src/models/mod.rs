//! Data models for Workbook entities.
//!
//! This module defines the core data structures:
//! - `Record` - A task or bug work item (header fields plus free-form body)
//! - `RecordKind` - Tagged variant carrying the kind-specific fields
//! - `Status`, `Priority`, `Severity`, `BugSource` - Header enums
//! - `Collection` / `RecordRef` - Addressing across the two collections

pub mod body;
pub mod complexity;
pub mod graph;
pub mod ids;
pub mod lifecycle;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// One of the two record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Tasks,
    Bugs,
}

impl Collection {
    /// Directory name under the workbook root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Collection::Tasks => "tasks",
            Collection::Bugs => "bugs",
        }
    }

    /// Prefix used in qualified references (`task:0001`, `bug:0003`).
    pub fn ref_prefix(&self) -> &'static str {
        match self {
            Collection::Tasks => "task",
            Collection::Bugs => "bug",
        }
    }

    /// Heading of the collection's Master Index.
    pub fn index_title(&self) -> &'static str {
        match self {
            Collection::Tasks => "Tasks",
            Collection::Bugs => "Bugs",
        }
    }

    pub fn all() -> [Collection; 2] {
        [Collection::Tasks, Collection::Bugs]
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tasks" | "task" => Ok(Collection::Tasks),
            "bugs" | "bug" => Ok(Collection::Bugs),
            _ => Err(Error::InvalidInput(format!("Unknown collection: {}", s))),
        }
    }
}

/// A possibly cross-collection reference to a record (`0001`, `bug:0003`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordRef {
    pub collection: Collection,
    pub id: String,
}

impl RecordRef {
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }

    /// Parse a reference written inside a record of `home`.
    ///
    /// A bare id refers to `home`; `task:` and `bug:` prefixes select a collection.
    pub fn parse(s: &str, home: Collection) -> Result<Self> {
        let s = s.trim();
        let (collection, id) = match s.split_once(':') {
            Some((prefix, id)) => (prefix.parse::<Collection>()?, id),
            None => (home, s),
        };
        ids::validate(id)?;
        Ok(Self::new(collection, id))
    }

    /// Render the reference as written inside a record of `home`.
    pub fn to_reference(&self, home: Collection) -> String {
        if self.collection == home {
            self.id.clone()
        } else {
            self.qualified()
        }
    }

    /// Fully qualified form, used as graph node key.
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.collection.ref_prefix(), self.id)
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// Lifecycle status of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// Master Index checkbox token. Exactly one per status, plain ASCII.
    pub fn glyph(&self) -> &'static str {
        match self {
            Status::Pending => "[ ]",
            Status::InProgress => "[>]",
            Status::Completed => "[x]",
            Status::Failed => "[!]",
        }
    }

    pub fn from_glyph(glyph: &str) -> Option<Self> {
        match glyph {
            "[ ]" => Some(Status::Pending),
            "[>]" => Some(Status::InProgress),
            "[x]" => Some(Status::Completed),
            "[!]" => Some(Status::Failed),
            _ => None,
        }
    }

    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn all() -> [Status; 4] {
        [
            Status::Pending,
            Status::InProgress,
            Status::Completed,
            Status::Failed,
        ]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "in_progress" | "in-progress" | "inprogress" => Ok(Status::InProgress),
            "completed" | "complete" | "done" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            _ => Err(Error::InvalidInput(format!("Invalid status: {}", s))),
        }
    }
}

/// Priority of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(Error::InvalidInput(format!("Invalid priority: {}", s))),
        }
    }
}

/// Bug severity, used for SLA classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Response and fix expectations attached to a severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sla {
    pub response: Duration,
    pub fix: Duration,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn sla(&self) -> Sla {
        match self {
            Severity::Critical => Sla {
                response: Duration::hours(1),
                fix: Duration::hours(24),
            },
            Severity::High => Sla {
                response: Duration::hours(4),
                fix: Duration::days(3),
            },
            Severity::Medium => Sla {
                response: Duration::days(1),
                fix: Duration::days(7),
            },
            Severity::Low => Sla {
                response: Duration::days(3),
                fix: Duration::days(30),
            },
        }
    }

    /// Priority given to the fix task generated for a bug of this severity.
    pub fn fix_priority(&self) -> Priority {
        match self {
            Severity::Critical => Priority::Critical,
            Severity::High => Priority::High,
            Severity::Medium => Priority::Medium,
            Severity::Low => Priority::Low,
        }
    }

    pub fn all() -> [Severity; 4] {
        [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(Error::InvalidInput(format!("Invalid severity: {}", s))),
        }
    }
}

/// Where a bug was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugSource {
    UserReported,
    Development,
    Testing,
    Production,
}

impl BugSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BugSource::UserReported => "user_reported",
            BugSource::Development => "development",
            BugSource::Testing => "testing",
            BugSource::Production => "production",
        }
    }
}

impl fmt::Display for BugSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BugSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "user_reported" | "user" => Ok(BugSource::UserReported),
            "development" | "dev" => Ok(BugSource::Development),
            "testing" | "test" => Ok(BugSource::Testing),
            "production" | "prod" => Ok(BugSource::Production),
            _ => Err(Error::InvalidInput(format!("Invalid bug source: {}", s))),
        }
    }
}

/// Kind of a record in the task collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Task,
    BugFix,
    Feature,
    RetroactiveFix,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Task => "task",
            TaskKind::BugFix => "bug_fix",
            TaskKind::Feature => "feature",
            TaskKind::RetroactiveFix => "retroactive_fix",
        }
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "task" => Ok(TaskKind::Task),
            "bug_fix" | "bugfix" => Ok(TaskKind::BugFix),
            "feature" => Ok(TaskKind::Feature),
            "retroactive_fix" | "retroactive" => Ok(TaskKind::RetroactiveFix),
            _ => Err(Error::InvalidInput(format!("Invalid task kind: {}", s))),
        }
    }
}

/// How a bug reached its closed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closure {
    /// Closed because the linked fix task completed.
    Fixed { task_id: String },
    /// Closed manually with no completed fix task.
    WithoutFix { reason: String },
}

/// Kind-specific part of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Task {
        kind: TaskKind,
        /// Weak reference into the bug collection.
        bug_reference: Option<String>,
    },
    Bug {
        severity: Severity,
        source: BugSource,
        closure: Option<Closure>,
    },
}

impl RecordKind {
    /// Value of the `kind` header field.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Task { kind, .. } => kind.as_str(),
            RecordKind::Bug { .. } => "defect",
        }
    }

    /// Type prefix shown in the Master Index.
    pub fn type_prefix(&self) -> &'static str {
        match self {
            RecordKind::Task { kind, .. } => match kind {
                TaskKind::Task => "TASK",
                TaskKind::BugFix => "FIX",
                TaskKind::Feature => "FEAT",
                TaskKind::RetroactiveFix => "RETRO",
            },
            RecordKind::Bug { .. } => "BUG",
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            RecordKind::Task { .. } => Collection::Tasks,
            RecordKind::Bug { .. } => Collection::Bugs,
        }
    }
}

/// A task or bug work item.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Identifier, unique within the collection (e.g., "0007", "0007.2")
    pub id: String,

    pub title: String,

    pub kind: RecordKind,

    pub status: Status,

    pub priority: Priority,

    /// Weak reference to the parent record in the same collection
    pub parent_id: Option<String>,

    /// Weak references to other records, bare or qualified (`bug:0003`)
    pub dependencies: Vec<String>,

    pub feature: Option<String>,

    pub subsystems: Vec<String>,

    /// Free-form effort estimate such as "3d", "2w" or "16h"
    pub estimated_effort: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Set only when the record enters `completed`
    pub completed_at: Option<DateTime<Utc>>,

    /// Header keys the schema does not know about, kept verbatim
    pub extra: toml::Table,

    /// Free-form body with recommended named sections
    pub body: String,
}

impl Record {
    /// Create a new pending task record.
    pub fn task(id: impl Into<String>, title: impl Into<String>, kind: TaskKind) -> Self {
        Self::with_kind(
            id.into(),
            title.into(),
            RecordKind::Task {
                kind,
                bug_reference: None,
            },
        )
    }

    /// Create a new pending bug record.
    pub fn bug(
        id: impl Into<String>,
        title: impl Into<String>,
        severity: Severity,
        source: BugSource,
    ) -> Self {
        Self::with_kind(
            id.into(),
            title.into(),
            RecordKind::Bug {
                severity,
                source,
                closure: None,
            },
        )
    }

    fn with_kind(id: String, title: String, kind: RecordKind) -> Self {
        Self {
            id,
            title,
            kind,
            status: Status::default(),
            priority: Priority::default(),
            parent_id: None,
            dependencies: Vec::new(),
            feature: None,
            subsystems: Vec::new(),
            estimated_effort: None,
            created_at: Utc::now(),
            completed_at: None,
            extra: toml::Table::new(),
            body: String::new(),
        }
    }

    pub fn collection(&self) -> Collection {
        self.kind.collection()
    }

    pub fn reference(&self) -> RecordRef {
        RecordRef::new(self.collection(), self.id.clone())
    }

    /// Dependencies resolved to references.
    pub fn dependency_refs(&self) -> Result<Vec<RecordRef>> {
        self.dependencies
            .iter()
            .map(|d| RecordRef::parse(d, self.collection()))
            .collect()
    }

    /// The bug this task fixes, if any.
    pub fn bug_reference(&self) -> Option<&str> {
        match &self.kind {
            RecordKind::Task { bug_reference, .. } => bug_reference.as_deref(),
            RecordKind::Bug { .. } => None,
        }
    }

    pub fn is_bug_fix(&self) -> bool {
        matches!(
            self.kind,
            RecordKind::Task {
                kind: TaskKind::BugFix,
                ..
            }
        )
    }

    /// Status as shown to people: a completed bug reads as `closed`.
    pub fn status_label(&self) -> &'static str {
        match (&self.kind, self.status) {
            (RecordKind::Bug { .. }, Status::Completed) => "closed",
            (_, status) => status.as_str(),
        }
    }

    /// True when a bug is past its SLA fix window and still open.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match &self.kind {
            RecordKind::Bug { severity, .. } => {
                !self.status.is_terminal() && now - self.created_at > severity.sla().fix
            }
            RecordKind::Task { .. } => false,
        }
    }
}
