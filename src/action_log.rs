//! Action logging for `wb` commands.
//!
//! Every command run against an initialized workbook appends one JSON line
//! to `<root>/.workbook/actions.jsonl`. Logging never fails a command;
//! write errors are reported through tracing and dropped.

use crate::config::schema::WORKBOOK_DIR;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the action log inside the workbook directory.
pub const ACTION_LOG_FILE: &str = "actions.jsonl";

/// Longest string argument kept verbatim.
const MAX_ARG_CHARS: usize = 100;

/// Longest array argument kept verbatim.
const MAX_ARG_ITEMS: usize = 10;

/// A single action log entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionLog {
    /// ISO 8601 timestamp when the command ran
    pub timestamp: DateTime<Utc>,

    /// Command name (e.g., "task create", "index sync")
    pub command: String,

    /// Command arguments as JSON
    pub args: serde_json::Value,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    pub user: String,
}

/// Path of the action log for a workbook root.
pub fn log_path(root: &Path) -> PathBuf {
    root.join(WORKBOOK_DIR).join(ACTION_LOG_FILE)
}

/// Append an action to the workbook's log.
///
/// Does nothing when logging is disabled or the workbook is not
/// initialized.
pub fn log_action(
    root: &Path,
    enabled: bool,
    command: &str,
    args: serde_json::Value,
    error: Option<String>,
    duration_ms: u64,
) {
    if !enabled || !root.join(WORKBOOK_DIR).is_dir() {
        return;
    }

    let entry = ActionLog {
        timestamp: Utc::now(),
        command: command.to_string(),
        args: sanitize_args(&args),
        success: error.is_none(),
        error,
        duration_ms,
        user: current_user(),
    };

    if let Err(e) = write_log_entry(&log_path(root), &entry) {
        tracing::warn!(error = %e, "failed to write action log");
    }
}

/// Read back every entry of the log, skipping unreadable lines.
pub fn read_actions(root: &Path) -> Result<Vec<ActionLog>> {
    let text = match std::fs::read_to_string(log_path(root)) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(text
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

fn write_log_entry(path: &Path, entry: &ActionLog) -> Result<()> {
    let json = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Shorten arguments before logging: long text is truncated, paths are
/// reduced to their file name and long lists are summarized.
fn sanitize_args(args: &serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), sanitize_args(value)))
                .collect(),
        ),
        serde_json::Value::Array(items) if items.len() > MAX_ARG_ITEMS => {
            serde_json::Value::String(format!("[{} items]", items.len()))
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sanitize_args).collect())
        }
        serde_json::Value::String(s) => {
            let s = if s.contains('/') || s.contains('\\') {
                s.rsplit(['/', '\\']).next().unwrap_or(s)
            } else {
                s.as_str()
            };
            let chars = s.chars().count();
            if chars > MAX_ARG_CHARS {
                let head: String = s.chars().take(MAX_ARG_CHARS - 3).collect();
                serde_json::Value::String(format!("{}... ({} chars)", head, chars))
            } else {
                serde_json::Value::String(s.to_string())
            }
        }
        _ => args.clone(),
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
