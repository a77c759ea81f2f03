//! Storage strategy trait and strategy selection.
//!
//! This module provides the two storage strategies for a collection:
//! - `FileBackend` - one file per record (default)
//! - `JournalBackend` - append-only entry blocks in a single file
//!
//! Both keep an active area and an archive area. The `Store` talks to
//! them only through [`RecordBackend`].

use crate::models::{Collection, Record};
use crate::{Error, Result};
use std::path::Path;

/// Which half of a collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Active,
    Archive,
}

impl Area {
    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Active => "active",
            Area::Archive => "archive",
        }
    }
}

/// Trait for storage strategies that persist the records of one collection.
pub trait RecordBackend: Send + Sync {
    /// Create the on-disk structure.
    fn init(&self) -> Result<()>;

    /// Check if this strategy's structure exists for the collection.
    fn exists(&self) -> bool;

    /// All records of an area, one per stored claim (duplicates included).
    fn load(&self, area: Area) -> Result<Vec<Record>>;

    /// Every id present in either area.
    fn ids(&self) -> Result<Vec<String>>;

    /// Fetch one record from an area.
    ///
    /// Returns `Conflict` if more than one record claims the id.
    fn get(&self, area: Area, id: &str) -> Result<Option<Record>>;

    /// Persist a new record into the active area.
    ///
    /// Must not overwrite an existing record; an occupied slot is a `Conflict`.
    fn create(&self, record: &Record) -> Result<()>;

    /// Replace an existing active record.
    fn save(&self, record: &Record) -> Result<()>;

    /// Every distinct stored creation of `id`, across both areas.
    fn claims(&self, id: &str) -> Result<Vec<Record>>;

    /// Move a record between areas, keeping its id.
    fn relocate(&self, id: &str, from: Area, to: Area) -> Result<()>;

    /// Storage location description (for display purposes).
    fn location(&self) -> String;

    fn strategy(&self) -> StorageStrategy;
}

/// Available storage strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StorageStrategy {
    /// One `<id>-<slug>.md` file per record
    #[default]
    Files,
    /// Append-only `journal.md`, latest block per id wins
    Journal,
}

impl StorageStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Journal => "journal",
        }
    }

    /// Strategy already laid out on disk for a collection directory, if any.
    pub fn detect(collection_dir: &Path) -> Option<Self> {
        if collection_dir.join(super::journal::JOURNAL_FILE).exists() {
            Some(Self::Journal)
        } else if collection_dir.join(super::files::ITEMS_DIR).is_dir() {
            Some(Self::Files)
        } else {
            None
        }
    }

    /// Build the backend for a collection rooted at `root`.
    pub fn backend(&self, root: &Path, collection: Collection) -> Box<dyn RecordBackend> {
        let dir = root.join(collection.dir_name());
        match self {
            Self::Files => Box::new(super::files::FileBackend::new(dir, collection)),
            Self::Journal => Box::new(super::journal::JournalBackend::new(dir, collection)),
        }
    }
}

impl std::str::FromStr for StorageStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "files" | "file" => Ok(Self::Files),
            "journal" | "append" => Ok(Self::Journal),
            _ => Err(Error::InvalidInput(format!(
                "Unknown storage strategy: {} (expected files or journal)",
                s
            ))),
        }
    }
}

impl std::fmt::Display for StorageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reduce stored records to distinct creations of `id`.
///
/// Two blocks or files belong to the same creation when they share
/// `created_at`; later updates of one record never change it.
pub(crate) fn distinct_claims(records: Vec<Record>, id: &str) -> Vec<Record> {
    let mut claims: Vec<Record> = Vec::new();
    for record in records.into_iter().filter(|r| r.id == id) {
        match claims.iter_mut().find(|c| c.created_at == record.created_at) {
            Some(existing) => *existing = record,
            None => claims.push(record),
        }
    }
    claims
}
