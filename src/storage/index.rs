//! Master Index rendering, parsing and verification.
//!
//! Each collection has one `INDEX.md`, grouped into configurable
//! sections, one line per record:
//!
//! ```text
//! - [>] FEAT 0007 (high) Parse config files
//! ```
//!
//! The index is a projection of the records. It can always be
//! regenerated from them, so every function here is pure.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::models::{ids, Collection, Priority, Record, Status};
use crate::{Error, Result};

pub const INDEX_FILE: &str = "INDEX.md";

/// Section for active records no configured section accepts.
pub const OTHER: &str = "Other";
/// Section for archived records no configured section accepts.
pub const OTHER_ARCHIVED: &str = "Other (archived)";

static ENTRY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- (\[[ >x!]\]) ([A-Z]+) ([0-9]+(?:\.[0-9]+)*) \(([a-z]+)\) (.+)$")
        .expect("Invalid index line regex")
});

/// One section of the Master Index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSection {
    pub name: String,
    /// Statuses accepted; empty accepts all
    pub statuses: Vec<Status>,
    /// Whether the section holds archived records
    pub archived: bool,
}

impl IndexSection {
    pub fn new(name: impl Into<String>, statuses: Vec<Status>) -> Self {
        Self {
            name: name.into(),
            statuses,
            archived: false,
        }
    }

    pub fn archived(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statuses: Vec::new(),
            archived: true,
        }
    }

    fn accepts(&self, status: Status, archived: bool) -> bool {
        self.archived == archived && (self.statuses.is_empty() || self.statuses.contains(&status))
    }
}

/// Caller-defined section layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexLayout {
    pub sections: Vec<IndexSection>,
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self {
            sections: vec![
                IndexSection::new("In Progress", vec![Status::InProgress]),
                IndexSection::new("Pending", vec![Status::Pending]),
                IndexSection::new("Completed", vec![Status::Completed]),
                IndexSection::new("Failed", vec![Status::Failed]),
                IndexSection::archived("Archived"),
            ],
        }
    }
}

impl IndexLayout {
    pub fn new(sections: Vec<IndexSection>) -> Result<Self> {
        let layout = Self { sections };
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for section in &self.sections {
            let name = section.name.trim();
            if name.is_empty() {
                return Err(Error::Config("index section names must not be empty".to_string()));
            }
            if name == OTHER || name == OTHER_ARCHIVED {
                return Err(Error::Config(format!("index section name `{}` is reserved", name)));
            }
            if seen.contains(&name) {
                return Err(Error::Config(format!("duplicate index section `{}`", name)));
            }
            seen.push(name);
        }
        Ok(())
    }

    /// Section a record with this status belongs to.
    pub fn section_for(&self, status: Status, archived: bool) -> &str {
        match self.sections.iter().find(|s| s.accepts(status, archived)) {
            Some(section) => &section.name,
            None if archived => OTHER_ARCHIVED,
            None => OTHER,
        }
    }

    fn is_archived_section(&self, name: &str) -> bool {
        match self.sections.iter().find(|s| s.name == name) {
            Some(section) => section.archived,
            None => name == OTHER_ARCHIVED,
        }
    }

    /// Sections in rendering order, including the fallbacks.
    fn section_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sections.iter().map(|s| s.name.as_str()).collect();
        names.push(OTHER);
        names.push(OTHER_ARCHIVED);
        names
    }
}

/// One summary line of the Master Index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub id: String,
    pub status: Status,
    pub prefix: String,
    pub priority: Priority,
    pub title: String,
    pub section: String,
    pub archived: bool,
}

impl IndexEntry {
    pub fn from_record(record: &Record, archived: bool, layout: &IndexLayout) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            prefix: record.kind.type_prefix().to_string(),
            priority: record.priority,
            title: record.title.trim().to_string(),
            section: layout.section_for(record.status, archived).to_string(),
            archived,
        }
    }

    /// The rendered line.
    pub fn line(&self) -> String {
        format!(
            "- {} {} {} ({}) {}",
            self.status.glyph(),
            self.prefix,
            self.id,
            self.priority,
            self.title
        )
    }
}

/// Render the full index text.
pub fn render(collection: Collection, layout: &IndexLayout, entries: &[IndexEntry]) -> String {
    let mut by_section: BTreeMap<&str, Vec<&IndexEntry>> = BTreeMap::new();
    for entry in entries {
        by_section.entry(entry.section.as_str()).or_default().push(entry);
    }

    let mut out = format!(
        "# {}\n\n<!-- Generated from the records. Edit records, then run `wb index sync`. -->\n",
        collection.index_title()
    );
    for name in layout.section_names() {
        let lines = by_section.remove(name).unwrap_or_default();
        let is_fallback = name == OTHER || name == OTHER_ARCHIVED;
        if is_fallback && lines.is_empty() {
            continue;
        }
        out.push_str(&format!("\n## {}\n", name));
        if lines.is_empty() {
            continue;
        }
        out.push('\n');
        let mut lines = lines;
        lines.sort_by(|a, b| ids::compare(&a.id, &b.id));
        for entry in lines {
            out.push_str(&entry.line());
            out.push('\n');
        }
    }
    out
}

/// Parsed index content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIndex {
    pub entries: Vec<IndexEntry>,
    /// Entry-like lines that did not parse, with their line number
    pub malformed: Vec<(usize, String)>,
}

/// Parse an index file.
pub fn parse(text: &str, layout: &IndexLayout) -> ParsedIndex {
    let mut parsed = ParsedIndex::default();
    let mut section = OTHER.to_string();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if let Some(name) = line.strip_prefix("## ") {
            section = name.trim().to_string();
            continue;
        }
        if !line.starts_with("- ") {
            continue;
        }
        match parse_line(line, &section, layout) {
            Some(entry) => parsed.entries.push(entry),
            None => parsed.malformed.push((n + 1, line.to_string())),
        }
    }
    parsed
}

fn parse_line(line: &str, section: &str, layout: &IndexLayout) -> Option<IndexEntry> {
    let caps = ENTRY_LINE.captures(line)?;
    Some(IndexEntry {
        status: Status::from_glyph(&caps[1])?,
        prefix: caps[2].to_string(),
        id: caps[3].to_string(),
        priority: caps[4].parse().ok()?,
        title: caps[5].trim().to_string(),
        section: section.to_string(),
        archived: layout.is_archived_section(section),
    })
}

/// An entry whose line or placement differs from its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMismatch {
    pub id: String,
    pub expected: String,
    pub actual: String,
}

/// Differences between a collection's records and its index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexDrift {
    /// Records with no index line
    pub missing: Vec<String>,
    /// Index lines with no record
    pub orphaned: Vec<String>,
    /// Ids listed more than once
    pub duplicated: Vec<String>,
    pub mismatched: Vec<IndexMismatch>,
    pub malformed: Vec<String>,
}

impl IndexDrift {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.orphaned.is_empty()
            && self.duplicated.is_empty()
            && self.mismatched.is_empty()
            && self.malformed.is_empty()
    }
}

/// Compare the entries the records imply with what the index holds.
pub fn verify(expected: &[IndexEntry], actual: &ParsedIndex) -> IndexDrift {
    let mut drift = IndexDrift::default();

    let mut want: BTreeMap<&str, Vec<&IndexEntry>> = BTreeMap::new();
    for entry in expected {
        want.entry(entry.id.as_str()).or_default().push(entry);
    }
    let mut have: BTreeMap<&str, Vec<&IndexEntry>> = BTreeMap::new();
    for entry in &actual.entries {
        have.entry(entry.id.as_str()).or_default().push(entry);
    }

    for (id, wanted) in &want {
        match have.get(id) {
            None => drift.missing.push(id.to_string()),
            Some(found) if found.len() != wanted.len() => {
                if found.len() > wanted.len() {
                    drift.duplicated.push(id.to_string());
                } else {
                    drift.missing.push(id.to_string());
                }
            }
            Some(found) => {
                for (w, f) in wanted.iter().zip(found.iter()) {
                    if w.line() != f.line() || w.section != f.section {
                        drift.mismatched.push(IndexMismatch {
                            id: id.to_string(),
                            expected: format!("[{}] {}", w.section, w.line()),
                            actual: format!("[{}] {}", f.section, f.line()),
                        });
                    }
                }
            }
        }
    }
    for (id, found) in &have {
        if !want.contains_key(id) {
            drift.orphaned.push(id.to_string());
            if found.len() > 1 {
                drift.duplicated.push(id.to_string());
            }
        }
    }
    drift.malformed = actual
        .malformed
        .iter()
        .map(|(n, line)| format!("line {}: {}", n, line))
        .collect();

    ids::sort(&mut drift.missing);
    ids::sort(&mut drift.orphaned);
    ids::sort(&mut drift.duplicated);
    drift
}

/// Filter for collection scans over the index.
#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    /// Type prefix such as `FIX`
    pub prefix: Option<String>,
    pub include_archived: bool,
}

impl IndexFilter {
    pub fn matches(&self, entry: &IndexEntry) -> bool {
        if entry.archived && !self.include_archived {
            return false;
        }
        if self.status.is_some_and(|s| s != entry.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != entry.priority) {
            return false;
        }
        match &self.prefix {
            Some(prefix) => prefix.eq_ignore_ascii_case(&entry.prefix),
            None => true,
        }
    }
}
