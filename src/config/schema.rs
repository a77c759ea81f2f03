//! KDL schema for config.kdl.
//!
//! This module provides:
//! - Rust structs representing the KDL schema
//! - Serialization/deserialization to/from KDL format
//! - Validation
//! - File locations and loading

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::models::{Collection, Status};
use crate::storage::StorageStrategy;
use crate::storage::index::{IndexLayout, IndexSection};
use crate::{Error, Result};

/// Directory under the workbook root that marks an initialized workbook.
pub const WORKBOOK_DIR: &str = ".workbook";

/// Config file name, at both levels.
pub const CONFIG_FILE: &str = "config.kdl";

/// Environment variable overriding the user config directory.
pub const CONFIG_HOME_ENV: &str = "WB_CONFIG_HOME";

/// Accepted `log-level` values.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// id-width 4
/// output-format "human"  // or "json"
/// log-level "info"
/// action-log "on"        // or "off"
/// collection "tasks" storage="files"
/// collection "bugs" storage="journal"
/// index {
///     section "In Progress" status="in_progress"
///     section "Backlog" status="pending"
///     section "Archived" archived="true"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkbookConfig {
    /// Zero padding of top-level ids
    pub id_width: Option<usize>,

    pub output_format: Option<OutputFormat>,

    /// Default tracing filter for the CLI
    pub log_level: Option<String>,

    /// Whether CLI invocations are appended to actions.jsonl
    pub action_log: Option<bool>,

    pub tasks_storage: Option<StorageStrategy>,

    pub bugs_storage: Option<StorageStrategy>,

    /// Master Index sections, in order
    pub index_sections: Option<Vec<IndexSection>>,
}

impl WorkbookConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(width) = self.id_width {
            if !(1..=12).contains(&width) {
                return Err(format!("id-width must be 1-12, got {}", width));
            }
        }
        if let Some(level) = &self.log_level {
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "log-level must be one of {}, got {}",
                    LOG_LEVELS.join(", "),
                    level
                ));
            }
        }
        if let Some(sections) = &self.index_sections {
            IndexLayout::new(sections.clone()).map_err(|e| error_detail(&e))?;
        }
        Ok(())
    }

    /// Storage strategy requested for a collection, if any.
    pub fn storage_for(&self, collection: Collection) -> Option<StorageStrategy> {
        match collection {
            Collection::Tasks => self.tasks_storage,
            Collection::Bugs => self.bugs_storage,
        }
    }

    pub fn set_storage(&mut self, collection: Collection, strategy: StorageStrategy) {
        match collection {
            Collection::Tasks => self.tasks_storage = Some(strategy),
            Collection::Bugs => self.bugs_storage = Some(strategy),
        }
    }

    /// The configured index layout, or the default one.
    pub fn index_layout(&self) -> Result<IndexLayout> {
        match &self.index_sections {
            Some(sections) => IndexLayout::new(sections.clone()),
            None => Ok(IndexLayout::default()),
        }
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        let mut config = Self::new();

        if let Some(node) = doc.get("id-width") {
            if let Some(i) = first_arg(node).and_then(|v| v.as_integer()) {
                config.id_width = Some(usize::try_from(i).map_err(|_| {
                    Error::Config(format!("id-width must be positive, got {}", i))
                })?);
            }
        }

        if let Some(node) = doc.get("output-format") {
            if let Some(s) = first_arg(node).and_then(|v| v.as_string()) {
                config.output_format = Some(OutputFormat::parse(s).ok_or_else(|| {
                    Error::Config(format!("output-format must be json or human, got {}", s))
                })?);
            }
        }

        if let Some(node) = doc.get("log-level") {
            if let Some(s) = first_arg(node).and_then(|v| v.as_string()) {
                config.log_level = Some(s.to_lowercase());
            }
        }

        if let Some(node) = doc.get("action-log") {
            config.action_log = first_arg(node).and_then(as_flag);
        }

        for node in doc.nodes() {
            if node.name().value() != "collection" {
                continue;
            }
            let name = first_arg(node)
                .and_then(|v| v.as_string())
                .ok_or_else(|| Error::Config("collection node needs a name".to_string()))?;
            let collection: Collection = name
                .parse()
                .map_err(|_| Error::Config(format!("unknown collection `{}`", name)))?;
            if let Some(storage) = prop(node, "storage").and_then(|v| v.as_string()) {
                let strategy = storage
                    .parse()
                    .map_err(|_| Error::Config(format!("unknown storage strategy `{}`", storage)))?;
                config.set_storage(collection, strategy);
            }
        }

        if let Some(index) = doc.get("index") {
            let mut sections = Vec::new();
            if let Some(children) = index.children() {
                for child in children.nodes() {
                    if child.name().value() == "section" {
                        sections.push(parse_section(child)?);
                    }
                }
            }
            config.index_sections = Some(sections);
        }

        config.validate().map_err(Error::Config)?;
        Ok(config)
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(width) = self.id_width {
            let mut node = KdlNode::new("id-width");
            node.push(KdlEntry::new(KdlValue::Integer(width as i128)));
            doc.nodes_mut().push(node);
        }

        if let Some(format) = self.output_format {
            let mut node = KdlNode::new("output-format");
            node.push(KdlEntry::new(KdlValue::String(format.as_str().to_string())));
            doc.nodes_mut().push(node);
        }

        if let Some(ref level) = self.log_level {
            let mut node = KdlNode::new("log-level");
            node.push(KdlEntry::new(KdlValue::String(level.clone())));
            doc.nodes_mut().push(node);
        }

        if let Some(enabled) = self.action_log {
            let mut node = KdlNode::new("action-log");
            let value = if enabled { "on" } else { "off" };
            node.push(KdlEntry::new(KdlValue::String(value.to_string())));
            doc.nodes_mut().push(node);
        }

        for collection in Collection::all() {
            if let Some(strategy) = self.storage_for(collection) {
                let mut node = KdlNode::new("collection");
                node.push(KdlEntry::new(KdlValue::String(collection.dir_name().to_string())));
                node.push(KdlEntry::new_prop(
                    "storage",
                    KdlValue::String(strategy.as_str().to_string()),
                ));
                doc.nodes_mut().push(node);
            }
        }

        if let Some(ref sections) = self.index_sections {
            let mut children = KdlDocument::new();
            for section in sections {
                let mut node = KdlNode::new("section");
                node.push(KdlEntry::new(KdlValue::String(section.name.clone())));
                if !section.statuses.is_empty() {
                    let statuses: Vec<&str> = section.statuses.iter().map(|s| s.as_str()).collect();
                    node.push(KdlEntry::new_prop(
                        "status",
                        KdlValue::String(statuses.join(",")),
                    ));
                }
                if section.archived {
                    node.push(KdlEntry::new_prop(
                        "archived",
                        KdlValue::String("true".to_string()),
                    ));
                }
                children.nodes_mut().push(node);
            }
            let mut node = KdlNode::new("index");
            node.set_children(children);
            doc.nodes_mut().push(node);
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &WorkbookConfig) {
        if other.id_width.is_some() {
            self.id_width = other.id_width;
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level.clone();
        }
        if other.action_log.is_some() {
            self.action_log = other.action_log;
        }
        if other.tasks_storage.is_some() {
            self.tasks_storage = other.tasks_storage;
        }
        if other.bugs_storage.is_some() {
            self.bugs_storage = other.bugs_storage;
        }
        if other.index_sections.is_some() {
            self.index_sections = other.index_sections.clone();
        }
    }

    /// Load a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Self::from_kdl(&doc)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), error_detail(&e))))
    }

    /// Write the config to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut doc = self.to_kdl();
        doc.autoformat();
        fs::write(path, doc.to_string())?;
        Ok(())
    }
}

fn error_detail(e: &Error) -> String {
    match e {
        Error::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Path of the workbook-level config.
pub fn workbook_config_path(root: &Path) -> PathBuf {
    root.join(WORKBOOK_DIR).join(CONFIG_FILE)
}

/// Nearest directory at or above `start` holding a `.workbook` directory.
pub fn find_workbook_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(WORKBOOK_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Path of the user-level config, if a config directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    match std::env::var(CONFIG_HOME_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir).join(CONFIG_FILE)),
        _ => dirs::config_dir().map(|d| d.join("workbook").join(CONFIG_FILE)),
    }
}

fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn prop<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(name))
        .map(|e| e.value())
}

/// Accept `#true`, `"true"`, `"on"` and friends.
fn as_flag(value: &KdlValue) -> Option<bool> {
    if let Some(b) = value.as_bool() {
        return Some(b);
    }
    match value.as_string()?.to_lowercase().as_str() {
        "true" | "on" | "yes" => Some(true),
        "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn parse_section(node: &KdlNode) -> Result<IndexSection> {
    let name = first_arg(node)
        .and_then(|v| v.as_string())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| Error::Config("index section needs a name".to_string()))?;

    let mut statuses = Vec::new();
    if let Some(list) = prop(node, "status").and_then(|v| v.as_string()) {
        for status in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            statuses.push(status.parse::<Status>().map_err(|_| {
                Error::Config(format!("section `{}`: unknown status `{}`", name, status))
            })?);
        }
    }
    let archived = prop(node, "archived").and_then(as_flag).unwrap_or(false);

    Ok(IndexSection {
        name,
        statuses,
        archived,
    })
}
