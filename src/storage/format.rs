//! Record text codec.
//!
//! A record is stored as:
//!
//! ```text
//! +++
//! id = "0007"
//! title = "Parse config files"
//! kind = "task"
//! status = "pending"
//! priority = "high"
//! created_at = "2026-01-04T09:12:44.120431Z"
//! +++
//!
//! ## Objective
//! ...
//! ```
//!
//! The same text doubles as a journal entry block: a journal is a
//! concatenation of encoded records, and a header-only block carrying
//! `tombstone = "<id>"` removes the id from that journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ids, BugSource, Closure, Priority, Record, RecordKind, Severity, Status, TaskKind,
};
use crate::{Error, Result};

/// Line that opens and closes a header block.
pub const DELIMITER: &str = "+++";

/// Maximum slug length in file names.
pub const MAX_SLUG_LEN: usize = 48;

const TOMBSTONE_KEY: &str = "tombstone";

/// On-disk header. Unknown keys are kept in `extra` and written back unchanged.
#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    id: String,
    title: String,
    kind: String,
    status: Status,
    priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feature: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    subsystems: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bug_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<BugSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    estimated_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closure: Option<ClosureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fixed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closure_reason: Option<String>,
    #[serde(default)]
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    extra: toml::Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ClosureKind {
    Fixed,
    WithoutFix,
}

/// A decoded journal block.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Record(Box<Record>),
    Tombstone(String),
}

/// Check the parts of a record the header schema cannot express.
pub fn validate(record: &Record) -> Result<()> {
    ids::validate(&record.id)?;
    if record.title.trim().is_empty() {
        return Err(Error::Validation(format!(
            "record {} has an empty title",
            record.id
        )));
    }
    if record.title.contains('\n') || record.title.contains('\r') {
        return Err(Error::Validation(format!(
            "record {} title must be a single line",
            record.id
        )));
    }
    if let Some(parent) = &record.parent_id {
        ids::validate(parent)?;
    }
    if record.extra.contains_key(TOMBSTONE_KEY) {
        return Err(Error::Validation(format!(
            "`{}` is a reserved header key",
            TOMBSTONE_KEY
        )));
    }
    if record.body.lines().any(|l| l.trim_end() == DELIMITER) {
        return Err(Error::Validation(format!(
            "record {} body contains a bare `{}` line",
            record.id, DELIMITER
        )));
    }
    Ok(())
}

/// Encode a record as header plus body.
pub fn encode(record: &Record) -> Result<String> {
    validate(record)?;
    let header = toml::to_string(&RecordHeader::from_record(record))
        .map_err(|e| Error::Validation(format!("cannot encode record {}: {}", record.id, e)))?;

    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&header);
    if !header.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    if !record.body.is_empty() {
        out.push('\n');
        out.push_str(&record.body);
        out.push('\n');
    }
    Ok(out)
}

/// Decode a record from its text.
pub fn decode(text: &str) -> Result<Record> {
    match decode_entry(text)? {
        Entry::Record(record) => Ok(*record),
        Entry::Tombstone(id) => Err(Error::Validation(format!(
            "expected a record, found a tombstone for {}",
            id
        ))),
    }
}

/// Decode a record or a tombstone block.
pub fn decode_entry(text: &str) -> Result<Entry> {
    let (header, body) = split_header(text)?;
    let table: toml::Table = header
        .parse()
        .map_err(|e| Error::Validation(format!("malformed header: {}", e)))?;

    if let Some(value) = table.get(TOMBSTONE_KEY) {
        let id = value
            .as_str()
            .ok_or_else(|| Error::Validation("tombstone must name an id".to_string()))?;
        ids::validate(id)?;
        return Ok(Entry::Tombstone(id.to_string()));
    }

    let header: RecordHeader = toml::Value::Table(table)
        .try_into()
        .map_err(|e| Error::Validation(format!("invalid header: {}", e)))?;
    let record = header.into_record(body.to_string())?;
    validate(&record)?;
    Ok(Entry::Record(Box::new(record)))
}

/// Encode a header-only tombstone block.
pub fn encode_tombstone(id: &str) -> String {
    format!("{d}\n{k} = \"{id}\"\n{d}\n", d = DELIMITER, k = TOMBSTONE_KEY, id = id)
}

/// Split record text into header and body.
fn split_header(text: &str) -> Result<(&str, &str)> {
    let text = text.trim_start_matches('\u{feff}');
    let mut lines = text.split_inclusive('\n');
    let mut offset = 0;

    // Skip blank lines before the opening delimiter.
    let header_start = loop {
        let Some(line) = lines.next() else {
            return Err(Error::Validation("missing header block".to_string()));
        };
        offset += line.len();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == DELIMITER {
            break offset;
        }
        return Err(Error::Validation(format!(
            "record must start with `{}`",
            DELIMITER
        )));
    };

    for line in lines {
        let line_start = offset;
        offset += line.len();
        if line.trim_end() == DELIMITER {
            let header = &text[header_start..line_start];
            let body = &text[offset..];
            let body = body.strip_prefix('\n').unwrap_or(body);
            let body = body.strip_suffix('\n').unwrap_or(body);
            return Ok((header, body));
        }
    }
    Err(Error::Validation("unterminated header block".to_string()))
}

/// Split a journal into its entry blocks.
///
/// Text before the first delimiter is treated as preamble and ignored.
pub fn split_blocks(text: &str) -> Vec<&str> {
    let mut starts = Vec::new();
    let mut in_header = false;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            if !in_header {
                starts.push(offset);
            }
            in_header = !in_header;
        }
        offset += line.len();
    }

    let mut blocks = Vec::with_capacity(starts.len());
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        blocks.push(&text[*start..end]);
    }
    blocks
}

/// File-name slug of a title.
pub fn slug(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in title.chars() {
        if !c.is_ascii_alphanumeric() {
            pending_dash = true;
            continue;
        }
        let needed = if pending_dash && !slug.is_empty() { 2 } else { 1 };
        if slug.len() + needed > MAX_SLUG_LEN {
            break;
        }
        if needed == 2 {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(c.to_ascii_lowercase());
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

impl RecordHeader {
    fn from_record(record: &Record) -> Self {
        let mut header = Self {
            id: record.id.clone(),
            title: record.title.clone(),
            kind: record.kind.as_str().to_string(),
            status: record.status,
            priority: record.priority,
            parent_id: record.parent_id.clone(),
            feature: record.feature.clone(),
            subsystems: record.subsystems.clone(),
            dependencies: record.dependencies.clone(),
            bug_reference: None,
            severity: None,
            source: None,
            estimated_effort: record.estimated_effort.clone(),
            closure: None,
            fixed_by: None,
            closure_reason: None,
            created_at: record.created_at,
            completed_at: record.completed_at,
            extra: record.extra.clone(),
        };

        match &record.kind {
            RecordKind::Task { bug_reference, .. } => {
                header.bug_reference = bug_reference.clone();
            }
            RecordKind::Bug {
                severity,
                source,
                closure,
            } => {
                header.severity = Some(*severity);
                header.source = Some(*source);
                match closure {
                    Some(Closure::Fixed { task_id }) => {
                        header.closure = Some(ClosureKind::Fixed);
                        header.fixed_by = Some(task_id.clone());
                    }
                    Some(Closure::WithoutFix { reason }) => {
                        header.closure = Some(ClosureKind::WithoutFix);
                        header.closure_reason = Some(reason.clone());
                    }
                    None => {}
                }
            }
        }
        header
    }

    fn into_record(self, body: String) -> Result<Record> {
        let id = self.id;
        let kind = if self.kind == "defect" {
            let severity = self.severity.ok_or_else(|| {
                Error::Validation(format!("defect {} is missing `severity`", id))
            })?;
            let source = self
                .source
                .ok_or_else(|| Error::Validation(format!("defect {} is missing `source`", id)))?;
            if self.bug_reference.is_some() {
                return Err(Error::Validation(format!(
                    "defect {} cannot carry `bug_reference`",
                    id
                )));
            }
            let closure = match self.closure {
                None => None,
                Some(ClosureKind::Fixed) => Some(Closure::Fixed {
                    task_id: self.fixed_by.ok_or_else(|| {
                        Error::Validation(format!("defect {} closed as fixed without `fixed_by`", id))
                    })?,
                }),
                Some(ClosureKind::WithoutFix) => Some(Closure::WithoutFix {
                    reason: self.closure_reason.unwrap_or_default(),
                }),
            };
            RecordKind::Bug {
                severity,
                source,
                closure,
            }
        } else {
            let kind: TaskKind = self
                .kind
                .parse()
                .map_err(|_| Error::Validation(format!("record {} has unknown kind `{}`", id, self.kind)))?;
            if self.severity.is_some() || self.source.is_some() || self.closure.is_some() {
                return Err(Error::Validation(format!(
                    "task {} carries defect-only fields",
                    id
                )));
            }
            RecordKind::Task {
                kind,
                bug_reference: self.bug_reference,
            }
        };

        Ok(Record {
            id,
            title: self.title,
            kind,
            status: self.status,
            priority: self.priority,
            parent_id: self.parent_id,
            dependencies: self.dependencies,
            feature: self.feature,
            subsystems: self.subsystems,
            estimated_effort: self.estimated_effort,
            created_at: self.created_at,
            completed_at: self.completed_at,
            extra: self.extra,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Record {
        let mut record = Record::task("0007", "Parse config files", TaskKind::Feature);
        record.priority = Priority::High;
        record.dependencies = vec!["0003".to_string(), "bug:0002".to_string()];
        record.subsystems = vec!["config".to_string(), "cli".to_string()];
        record.estimated_effort = Some("3d".to_string());
        record.body = "## Objective\n\nRead KDL.\n\n## Acceptance Criteria\n\n- [ ] parses".to_string();
        record
    }

    #[test]
    fn test_encode_shape() {
        let text = encode(&sample_task()).unwrap();
        assert!(text.starts_with("+++\n"));
        assert!(text.contains("id = \"0007\""));
        assert!(text.contains("kind = \"feature\""));
        assert!(text.contains("status = \"pending\""));
        assert!(text.contains("\n+++\n\n## Objective"));
        assert!(!text.contains("severity"));
    }

    #[test]
    fn test_decode_task() {
        let record = sample_task();
        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_closed_bug() {
        let mut bug = Record::bug("0002", "Crash on start", Severity::Critical, BugSource::Production);
        bug.status = Status::Completed;
        bug.completed_at = Some(Utc::now());
        if let RecordKind::Bug { closure, .. } = &mut bug.kind {
            *closure = Some(Closure::Fixed {
                task_id: "0004".to_string(),
            });
        }
        let text = encode(&bug).unwrap();
        assert!(text.contains("kind = \"defect\""));
        assert!(text.contains("closure = \"fixed\""));
        assert!(text.contains("fixed_by = \"0004\""));
        assert_eq!(decode(&text).unwrap(), bug);
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let text = "+++\nid = \"0001\"\ntitle = \"t\"\nkind = \"task\"\nstatus = \"pending\"\npriority = \"low\"\ncomponents = [\"a\", \"b\"]\nsize_points = 5\n+++\n";
        let record = decode(text).unwrap();
        assert_eq!(record.extra.get("size_points").and_then(|v| v.as_integer()), Some(5));
        assert!(record.body.is_empty());

        let again = encode(&record).unwrap();
        assert!(again.contains("size_points = 5"));
        assert!(again.contains("components = ["));
    }

    #[test]
    fn test_missing_required_field() {
        let text = "+++\nid = \"0001\"\nkind = \"task\"\nstatus = \"pending\"\npriority = \"low\"\n+++\n";
        assert!(matches!(decode(text), Err(Error::Validation(_))));
    }

    #[test]
    fn test_defect_requires_severity() {
        let text = "+++\nid = \"0001\"\ntitle = \"b\"\nkind = \"defect\"\nstatus = \"pending\"\npriority = \"low\"\nsource = \"testing\"\n+++\n";
        let err = decode(text).unwrap_err();
        assert!(err.to_string().contains("severity"));
    }

    #[test]
    fn test_unknown_kind_and_status() {
        let text = "+++\nid = \"0001\"\ntitle = \"t\"\nkind = \"epic\"\nstatus = \"pending\"\npriority = \"low\"\n+++\n";
        assert!(matches!(decode(text), Err(Error::Validation(_))));
        let text = "+++\nid = \"0001\"\ntitle = \"t\"\nkind = \"task\"\nstatus = \"closed\"\npriority = \"low\"\n+++\n";
        assert!(matches!(decode(text), Err(Error::Validation(_))));
    }

    #[test]
    fn test_unterminated_header() {
        assert!(decode("+++\nid = \"0001\"\n").is_err());
        assert!(decode("no header here").is_err());
    }

    #[test]
    fn test_body_delimiter_is_rejected() {
        let mut record = sample_task();
        record.body = "line\n+++\nmore".to_string();
        assert!(matches!(encode(&record), Err(Error::Validation(_))));
    }

    #[test]
    fn test_multiline_title_is_rejected() {
        let mut record = sample_task();
        record.title = "two\nlines".to_string();
        assert!(matches!(encode(&record), Err(Error::Validation(_))));
    }

    #[test]
    fn test_split_blocks() {
        let a = encode(&Record::task("0001", "a", TaskKind::Task)).unwrap();
        let mut b = Record::task("0002", "b", TaskKind::Task);
        b.body = "body of b".to_string();
        let b = encode(&b).unwrap();
        let journal = format!("# Journal\n\n{}{}{}", a, b, encode_tombstone("0001"));

        let blocks = split_blocks(&journal);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], a);
        assert_eq!(blocks[1], b);
        assert_eq!(
            decode_entry(blocks[2]).unwrap(),
            Entry::Tombstone("0001".to_string())
        );
        assert_eq!(decode(blocks[1]).unwrap().body, "body of b");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Parse config files"), "parse-config-files");
        assert_eq!(slug("  Fix: crash (on start)!  "), "fix-crash-on-start");
        assert_eq!(slug("???"), "untitled");
        assert!(slug(&"long title ".repeat(20)).len() <= MAX_SLUG_LEN);
    }
}
