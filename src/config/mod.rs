//! Configuration for Workbook.
//!
//! ## config.kdl
//!
//! Located at:
//! - Workbook: `<root>/.workbook/config.kdl`
//! - User: `<config_dir>/workbook/config.kdl` (`WB_CONFIG_HOME` overrides the directory)
//!
//! Contains:
//! - `id-width` - Zero padding of top-level ids
//! - `output-format` - "json" or "human"
//! - `log-level` - Default tracing filter
//! - `action-log` - "on" or "off"
//! - `collection` - Storage strategy per collection
//! - `index` - Master Index sections
//!
//! ## Precedence
//!
//! CLI flag > environment > workbook config > user config > defaults
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, LOG_ENV, OUTPUT_ENV, ROOT_ENV, Resolved, ResolvedConfig, ValueSource,
    resolve_config, resolve_config_with,
};
pub use schema::{OutputFormat, WorkbookConfig};
