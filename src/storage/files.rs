//! One-file-per-record storage strategy.
//!
//! Records live at `<collection>/items/<id>-<slug>.md`; archived records
//! move to `<collection>/archive/` under the same file name. The id in
//! the file name is authoritative for lookups, the header must agree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::backend::{distinct_claims, Area, RecordBackend, StorageStrategy};
use super::format;
use crate::models::{Collection, Record};
use crate::{Error, Result};

pub const ITEMS_DIR: &str = "items";
pub const ARCHIVE_DIR: &str = "archive";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-per-record backend for one collection.
pub struct FileBackend {
    dir: PathBuf,
    collection: Collection,
}

impl FileBackend {
    pub fn new(dir: PathBuf, collection: Collection) -> Self {
        Self { dir, collection }
    }

    fn area_dir(&self, area: Area) -> PathBuf {
        match area {
            Area::Active => self.dir.join(ITEMS_DIR),
            Area::Archive => self.dir.join(ARCHIVE_DIR),
        }
    }

    /// File name for a record.
    pub fn file_name(record: &Record) -> String {
        format!("{}-{}.md", record.id, format::slug(&record.title))
    }

    /// `(id, path)` for every record file of an area, in id order.
    fn entries(&self, area: Area) -> Result<Vec<(String, PathBuf)>> {
        let dir = self.area_dir(area);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if let Some(id) = id_from_path(&path) {
                entries.push((id, path));
            }
        }
        entries.sort_by(|a, b| crate::models::ids::compare(&a.0, &b.0).then(a.1.cmp(&b.1)));
        Ok(entries)
    }

    fn paths_for(&self, area: Area, id: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .entries(area)?
            .into_iter()
            .filter(|(entry_id, _)| entry_id == id)
            .map(|(_, path)| path)
            .collect())
    }

    fn read(&self, id: &str, path: &Path) -> Result<Record> {
        let text = fs::read_to_string(path)?;
        let record = format::decode(&text).map_err(|e| match e {
            Error::Validation(msg) => Error::Validation(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        if record.id != id {
            return Err(Error::Validation(format!(
                "{}: header id {} does not match file name",
                path.display(),
                record.id
            )));
        }
        if record.collection() != self.collection {
            return Err(Error::Validation(format!(
                "{}: {} record stored in the {} collection",
                path.display(),
                record.kind.as_str(),
                self.collection
            )));
        }
        Ok(record)
    }

    /// Write `text` to a hidden temp file next to `name`. The `.tmp`
    /// extension keeps it out of record listings.
    fn write_aside(&self, dir: &Path, name: &str, text: &str) -> Result<PathBuf> {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{}.{}.{}.tmp", name, std::process::id(), seq));
        fs::write(&tmp, text)?;
        Ok(tmp)
    }

    fn single_path(&self, area: Area, id: &str) -> Result<Option<PathBuf>> {
        let mut paths = self.paths_for(area, id)?;
        match paths.len() {
            0 => Ok(None),
            1 => Ok(paths.pop()),
            n => Err(Error::Conflict {
                id: id.to_string(),
                detail: format!("{} files in {} claim this id", n, self.area_dir(area).display()),
            }),
        }
    }
}

/// Id embedded in a record file name (`0007.2-some-title.md` -> `0007.2`).
fn id_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let id = stem.split_once('-').map(|(id, _)| id).unwrap_or(stem);
    crate::models::ids::validate(id).ok()?;
    Some(id.to_string())
}

impl RecordBackend for FileBackend {
    fn init(&self) -> Result<()> {
        fs::create_dir_all(self.area_dir(Area::Active))?;
        fs::create_dir_all(self.area_dir(Area::Archive))?;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.area_dir(Area::Active).is_dir()
    }

    fn load(&self, area: Area) -> Result<Vec<Record>> {
        self.entries(area)?
            .iter()
            .map(|(id, path)| self.read(id, path))
            .collect()
    }

    fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .entries(Area::Active)?
            .into_iter()
            .chain(self.entries(Area::Archive)?)
            .map(|(id, _)| id)
            .collect();
        crate::models::ids::sort(&mut ids);
        ids.dedup();
        Ok(ids)
    }

    fn get(&self, area: Area, id: &str) -> Result<Option<Record>> {
        match self.single_path(area, id)? {
            Some(path) => self.read(id, &path).map(Some),
            None => Ok(None),
        }
    }

    fn create(&self, record: &Record) -> Result<()> {
        let text = format::encode(record)?;
        let dir = self.area_dir(Area::Active);
        let path = dir.join(Self::file_name(record));

        // Linking a finished temp file into place never replaces an existing
        // record, and readers never see a partial one.
        let tmp = self.write_aside(&dir, &Self::file_name(record), &text)?;
        let linked = fs::hard_link(&tmp, &path);
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::Conflict {
                id: record.id.clone(),
                detail: format!("{} already exists", path.display()),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, record: &Record) -> Result<()> {
        let old = self
            .single_path(Area::Active, &record.id)?
            .ok_or_else(|| Error::NotFound(format!("{} {}", self.collection, record.id)))?;
        let text = format::encode(record)?;
        let dir = self.area_dir(Area::Active);
        let new = dir.join(Self::file_name(record));
        let tmp = self.write_aside(&dir, &Self::file_name(record), &text)?;
        fs::rename(&tmp, &new)?;
        if new != old {
            fs::remove_file(&old)?;
        }
        Ok(())
    }

    fn claims(&self, id: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for area in [Area::Active, Area::Archive] {
            for path in self.paths_for(area, id)? {
                // A rival may still be mid-write; an unreadable file is still a claim.
                let record = self.read(id, &path).map_err(|e| Error::Conflict {
                    id: id.to_string(),
                    detail: format!("unreadable claim {}: {}", path.display(), e),
                })?;
                records.push(record);
            }
        }
        Ok(distinct_claims(records, id))
    }

    fn relocate(&self, id: &str, from: Area, to: Area) -> Result<()> {
        let path = self
            .single_path(from, id)?
            .ok_or_else(|| Error::NotFound(format!("{} {} ({})", self.collection, id, from.as_str())))?;
        let target_dir = self.area_dir(to);
        fs::create_dir_all(&target_dir)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::NotFound(path.display().to_string()))?;
        fs::rename(&path, target_dir.join(file_name))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.area_dir(Area::Active).display().to_string()
    }

    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::Files
    }
}
