//! Workbook - A file-based task and bug tracker for AI agents and humans.
//!
//! This library provides the core functionality for the `wb` CLI tool:
//! record storage with a Master Index per collection, identifier
//! allocation, the status state machine, dependency validation,
//! complexity scoring with decomposition, and bug/task linkage.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod storage;

use models::{Collection, Status};


/// Library-level error type for Workbook operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not initialized: run `wb init` first")]
    NotInitialized,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An id collision detected after the write landed. Both records stay on disk.
    #[error("Conflict on id {id}: {detail}")]
    Conflict { id: String, detail: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("Cyclic dependency: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    /// Some writes of an operation landed and others did not. `ids` lists
    /// what is on disk; `recovery` says how to finish by hand.
    #[error("Partial failure in {collection} ({}): {detail}; {recovery}", ids.join(", "))]
    PartialFailure {
        collection: Collection,
        ids: Vec<String>,
        detail: String,
        recovery: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Recovery for a record that landed without its index entry.
pub const INDEX_SYNC_HINT: &str = "run `wb index sync`";

/// Result type alias for Workbook operations.
pub type Result<T> = std::result::Result<T, Error>;
