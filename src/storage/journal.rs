//! Append-only entry-block storage strategy.
//!
//! Every write appends the full record as one block to
//! `<collection>/journal.md`; the latest block per record wins. Archived
//! records are appended to `<collection>/archive.md` and a tombstone
//! block removes them from the journal. Nothing is ever rewritten in
//! place, so the files can be merged line-wise by a VCS.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::backend::{distinct_claims, Area, RecordBackend, StorageStrategy};
use super::format::{self, Entry};
use crate::models::{Collection, Record};
use crate::{Error, Result};

pub const JOURNAL_FILE: &str = "journal.md";
pub const ARCHIVE_FILE: &str = "archive.md";

/// Journal backend for one collection.
pub struct JournalBackend {
    dir: PathBuf,
    collection: Collection,
}

impl JournalBackend {
    pub fn new(dir: PathBuf, collection: Collection) -> Self {
        Self { dir, collection }
    }

    fn path(&self, area: Area) -> PathBuf {
        match area {
            Area::Active => self.dir.join(JOURNAL_FILE),
            Area::Archive => self.dir.join(ARCHIVE_FILE),
        }
    }

    fn preamble(&self, area: Area) -> String {
        let what = match area {
            Area::Active => "journal",
            Area::Archive => "archive",
        };
        format!(
            "# {} {}\n\nAppend-only. The latest block per id wins.\n\n",
            self.collection.index_title(),
            what
        )
    }

    /// Decoded blocks of one file, in write order.
    fn entries(&self, area: Area) -> Result<Vec<Entry>> {
        let path = self.path(area);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for block in format::split_blocks(&text) {
            let entry = format::decode_entry(block).map_err(|e| match e {
                Error::Validation(msg) => {
                    Error::Validation(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })?;
            if let Entry::Record(record) = &entry {
                if record.collection() != self.collection {
                    return Err(Error::Validation(format!(
                        "{}: {} record {} in the {} collection",
                        path.display(),
                        record.kind.as_str(),
                        record.id,
                        self.collection
                    )));
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Live records of an area: latest block per creation, minus tombstones.
    fn fold(&self, area: Area) -> Result<Vec<Record>> {
        let mut order: Vec<(String, DateTime<Utc>)> = Vec::new();
        let mut latest: HashMap<(String, DateTime<Utc>), Record> = HashMap::new();
        for entry in self.entries(area)? {
            match entry {
                Entry::Record(record) => {
                    let key = (record.id.clone(), record.created_at);
                    if !latest.contains_key(&key) {
                        order.push(key.clone());
                    }
                    latest.insert(key, *record);
                }
                Entry::Tombstone(id) => {
                    latest.retain(|(entry_id, _), _| *entry_id != id);
                    order.retain(|(entry_id, _)| *entry_id != id);
                }
            }
        }

        let mut records: Vec<Record> = order
            .into_iter()
            .filter_map(|key| latest.remove(&key))
            .collect();
        records.sort_by(|a, b| crate::models::ids::compare(&a.id, &b.id));
        Ok(records)
    }

    fn append(&self, area: Area, block: &str) -> Result<()> {
        let path = self.path(area);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(block.as_bytes())?;
        Ok(())
    }

    fn single(&self, area: Area, id: &str) -> Result<Option<Record>> {
        let mut matches: Vec<Record> = self
            .fold(area)?
            .into_iter()
            .filter(|r| r.id == id)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(Error::Conflict {
                id: id.to_string(),
                detail: format!("{} entries in {} claim this id", n, self.path(area).display()),
            }),
        }
    }
}

impl RecordBackend for JournalBackend {
    fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        for area in [Area::Active, Area::Archive] {
            let path = self.path(area);
            if !path.exists() {
                fs::write(&path, self.preamble(area))?;
            }
        }
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path(Area::Active).exists()
    }

    fn load(&self, area: Area) -> Result<Vec<Record>> {
        self.fold(area)
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .fold(Area::Active)?
            .into_iter()
            .chain(self.fold(Area::Archive)?)
            .map(|r| r.id)
            .collect();
        crate::models::ids::sort(&mut ids);
        ids.dedup();
        Ok(ids)
    }

    fn get(&self, area: Area, id: &str) -> Result<Option<Record>> {
        self.single(area, id)
    }

    fn create(&self, record: &Record) -> Result<()> {
        let block = format::encode(record)?;
        for area in [Area::Active, Area::Archive] {
            if self.fold(area)?.iter().any(|r| r.id == record.id) {
                return Err(Error::Conflict {
                    id: record.id.clone(),
                    detail: format!("already present in {}", self.path(area).display()),
                });
            }
        }
        self.append(Area::Active, &block)
    }

    fn save(&self, record: &Record) -> Result<()> {
        let block = format::encode(record)?;
        if self.single(Area::Active, &record.id)?.is_none() {
            return Err(Error::NotFound(format!("{} {}", self.collection, record.id)));
        }
        self.append(Area::Active, &block)
    }

    fn claims(&self, id: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for area in [Area::Active, Area::Archive] {
            // A rival may still be mid-append; an unreadable journal is a conflict.
            let entries = self.entries(area).map_err(|e| Error::Conflict {
                id: id.to_string(),
                detail: format!("unreadable {}: {}", self.path(area).display(), e),
            })?;
            records.extend(entries.into_iter().filter_map(|entry| match entry {
                Entry::Record(record) => Some(*record),
                Entry::Tombstone(_) => None,
            }));
        }
        Ok(distinct_claims(records, id))
    }

    fn relocate(&self, id: &str, from: Area, to: Area) -> Result<()> {
        let record = self.single(from, id)?.ok_or_else(|| {
            Error::NotFound(format!("{} {} ({})", self.collection, id, from.as_str()))
        })?;
        if !self.path(to).exists() {
            fs::write(self.path(to), self.preamble(to))?;
        }
        self.append(to, &format::encode(&record)?)?;
        self.append(from, &format::encode_tombstone(id))
    }

    fn location(&self) -> String {
        self.path(Area::Active).display().to_string()
    }

    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::Journal
    }
}
