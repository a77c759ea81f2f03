//! Unified precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`WB_OUTPUT`, `WB_LOG`)
//! 3. Workbook config (`<root>/.workbook/config.kdl`)
//! 4. User config (`<config_dir>/workbook/config.kdl`)
//! 5. Built-in defaults
//!
//! The root itself (`-C` / `WB_ROOT`) is resolved by the CLI before any
//! config file can be located.

use std::path::{Path, PathBuf};

use crate::Result;
use crate::config::OutputFormat;
use crate::config::schema::{WorkbookConfig, user_config_path, workbook_config_path};
use crate::models::Collection;
use crate::models::ids::DEFAULT_WIDTH;
use crate::storage::StorageStrategy;
use crate::storage::index::IndexLayout;

/// Environment variable naming the workbook root.
pub const ROOT_ENV: &str = "WB_ROOT";

/// Environment variable overriding the output format.
pub const OUTPUT_ENV: &str = "WB_OUTPUT";

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "WB_LOG";

/// Default tracing filter.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from `<root>/.workbook/config.kdl`
    Workbook,
    /// Value from the user config directory
    User,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Workbook => write!(f, "workbook"),
            ValueSource::User => write!(f, "user"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_format: Resolved<OutputFormat>,
    /// Tracing filter directive
    pub log_level: Resolved<String>,
    pub action_log: Resolved<bool>,
    pub id_width: Resolved<usize>,
    /// Requested strategy; `None` lets the store detect or default it
    pub tasks_storage: Option<Resolved<StorageStrategy>>,
    pub bugs_storage: Option<Resolved<StorageStrategy>>,
    pub index_layout: Resolved<IndexLayout>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
            log_level: Resolved::new(DEFAULT_LOG_LEVEL.to_string(), ValueSource::Default),
            action_log: Resolved::new(true, ValueSource::Default),
            id_width: Resolved::new(DEFAULT_WIDTH, ValueSource::Default),
            tasks_storage: None,
            bugs_storage: None,
            index_layout: Resolved::new(IndexLayout::default(), ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn log_level(&self) -> &str {
        &self.log_level.value
    }

    pub fn action_log_enabled(&self) -> bool {
        self.action_log.value
    }

    pub fn storage_for(&self, collection: Collection) -> Option<&Resolved<StorageStrategy>> {
        match collection {
            Collection::Tasks => self.tasks_storage.as_ref(),
            Collection::Bugs => self.bugs_storage.as_ref(),
        }
    }

    /// Flatten back into a config the store can be opened with.
    pub fn to_config(&self) -> WorkbookConfig {
        WorkbookConfig {
            id_width: Some(self.id_width.value),
            output_format: Some(self.output_format.value),
            log_level: Some(self.log_level.value.clone()),
            action_log: Some(self.action_log.value),
            tasks_storage: self.tasks_storage.as_ref().map(|r| r.value),
            bugs_storage: self.bugs_storage.as_ref().map(|r| r.value),
            index_sections: Some(self.index_layout.value.sections.clone()),
        }
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Output format override from CLI flag
    pub output_format: Option<OutputFormat>,
    pub tasks_storage: Option<StorageStrategy>,
    pub bugs_storage: Option<StorageStrategy>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set output format override.
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_storage(mut self, collection: Collection, strategy: StorageStrategy) -> Self {
        match collection {
            Collection::Tasks => self.tasks_storage = Some(strategy),
            Collection::Bugs => self.bugs_storage = Some(strategy),
        }
        self
    }
}

/// Pick the first layer that has a value.
fn layered<T: Clone>(
    cli: Option<T>,
    env: Option<(T, &str)>,
    workbook: Option<T>,
    user: Option<T>,
) -> Option<Resolved<T>> {
    if let Some(value) = cli {
        return Some(Resolved::new(value, ValueSource::CliFlag));
    }
    if let Some((value, name)) = env {
        return Some(Resolved::new(value, ValueSource::EnvVar(name.to_string())));
    }
    if let Some(value) = workbook {
        return Some(Resolved::new(value, ValueSource::Workbook));
    }
    user.map(|value| Resolved::new(value, ValueSource::User))
}

/// Resolve configuration for a workbook root with the full precedence chain.
pub fn resolve_config(root: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    resolve_config_with(
        root,
        overrides,
        |name| std::env::var(name).ok(),
        user_config_path(),
    )
}

/// Resolve configuration with an explicit environment lookup and user config path.
pub fn resolve_config_with<F>(
    root: &Path,
    overrides: &ConfigOverrides,
    env: F,
    user_path: Option<PathBuf>,
) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let user = match user_path {
        Some(path) => WorkbookConfig::load(&path)?,
        None => WorkbookConfig::new(),
    };
    let workbook = WorkbookConfig::load(&workbook_config_path(root))?;

    let mut result = ResolvedConfig::default();

    let env_format = env(OUTPUT_ENV)
        .filter(|v| !v.is_empty())
        .map(|v| {
            OutputFormat::parse(&v).ok_or_else(|| {
                crate::Error::Config(format!("{} must be json or human, got {}", OUTPUT_ENV, v))
            })
        })
        .transpose()?;
    if let Some(format) = layered(
        overrides.output_format,
        env_format.map(|f| (f, OUTPUT_ENV)),
        workbook.output_format,
        user.output_format,
    ) {
        result.output_format = format;
    }

    let env_log = env(LOG_ENV).filter(|v| !v.is_empty());
    if let Some(level) = layered(
        None,
        env_log.map(|v| (v, LOG_ENV)),
        workbook.log_level.clone(),
        user.log_level.clone(),
    ) {
        result.log_level = level;
    }

    if let Some(enabled) = layered(None, None, workbook.action_log, user.action_log) {
        result.action_log = enabled;
    }
    if let Some(width) = layered(None, None, workbook.id_width, user.id_width) {
        result.id_width = width;
    }

    result.tasks_storage = layered(
        overrides.tasks_storage,
        None,
        workbook.tasks_storage,
        user.tasks_storage,
    );
    result.bugs_storage = layered(
        overrides.bugs_storage,
        None,
        workbook.bugs_storage,
        user.bugs_storage,
    );

    if let Some(sections) = layered(
        None,
        None,
        workbook.index_sections.clone(),
        user.index_sections.clone(),
    ) {
        result.index_layout = Resolved::new(IndexLayout::new(sections.value)?, sections.source);
    }

    tracing::debug!(
        root = %root.display(),
        output = %result.output_format.value,
        log = %result.log_level.value,
        "resolved config"
    );
    Ok(result)
}
