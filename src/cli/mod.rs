//! CLI argument definitions for Workbook.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::complexity::CallerDecision;
use crate::models::{BugSource, Collection, Priority, Severity, Status, TaskKind};
use crate::storage::StorageStrategy;

/// Workbook - A file-based task and bug tracker for AI agents and humans.
///
/// Start with `wb init`, then `wb task ready` to find work.
#[derive(Parser, Debug)]
#[command(name = "wb")]
#[command(author, version, about = "A file-based task and bug tracker for AI agents and humans", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if wb was started in <path> instead of the current directory.
    /// Can also be set via WB_ROOT environment variable.
    #[arg(short = 'C', long = "root", global = true, env = "WB_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a workbook in the root directory
    Init {
        /// Storage strategy for tasks (files or journal)
        #[arg(long)]
        tasks_storage: Option<StorageStrategy>,

        /// Storage strategy for bugs (files or journal)
        #[arg(long)]
        bugs_storage: Option<StorageStrategy>,
    },

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Bug tracking commands
    Bug {
        #[command(subcommand)]
        command: BugCommands,
    },

    /// Master Index commands
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show recent entries of the action log
    Log {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new task
    Create {
        /// Task title
        title: String,

        /// Kind (task, bug_fix, feature, retroactive_fix)
        #[arg(short, long, default_value = "task")]
        kind: TaskKind,

        /// Priority (critical, high, medium, low)
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Parent task id; the new task gets the next child id
        #[arg(long)]
        parent: Option<String>,

        /// Bug this task fixes
        #[arg(long)]
        bug: Option<String>,

        /// Free-form effort estimate (e.g., 3d, 2w, 16h)
        #[arg(long)]
        effort: Option<String>,

        #[command(flatten)]
        details: DraftDetails,
    },

    /// Show a task with its readiness and children
    Show {
        /// Task id (e.g., 0007, 0007.2)
        id: String,
    },

    /// List tasks
    List {
        #[command(flatten)]
        filter: ListFilter,

        /// Kind filter (task, bug_fix, feature, retroactive_fix)
        #[arg(short, long)]
        kind: Option<String>,

        /// Only direct children of this id
        #[arg(long)]
        parent: Option<String>,
    },

    /// Update task fields or status
    Update {
        id: String,

        #[command(flatten)]
        fields: UpdateFields,

        /// Bug this task fixes ("" clears)
        #[arg(long)]
        bug: Option<String>,

        /// Free-form effort estimate ("" clears)
        #[arg(long)]
        effort: Option<String>,
    },

    /// Dependency management
    Deps {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Show tasks ready to work on (no incomplete dependencies)
    Ready,

    /// Show tasks waiting on dependencies
    Blocked,

    /// Score a task's complexity
    Assess {
        id: String,
    },

    /// Decompose a task into child tasks according to its complexity tier
    Decompose {
        id: String,

        /// Answer to the decomposition prompt (accept, decline, override).
        /// Without it, moderate and complex tasks only print the prompt.
        #[arg(short, long)]
        decision: Option<CallerDecision>,

        /// Child title (repeatable); proposed from the parent when omitted
        #[arg(long = "child")]
        children: Vec<String>,
    },

    /// Complete a parent whose children are all completed
    Rollup {
        id: String,
    },

    /// Move a completed or failed task to the archive
    Archive {
        id: String,
    },

    /// Bring an archived task back
    Restore {
        id: String,
    },

    /// Import record files, validating the whole batch first
    Import {
        /// Record files in the on-disk format
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Bug subcommands
#[derive(Subcommand, Debug)]
pub enum BugCommands {
    /// Report a new bug (a linked fix task is created unless --no-fix-task)
    Create {
        /// Bug title
        title: String,

        /// Severity (critical, high, medium, low)
        #[arg(short, long)]
        severity: Severity,

        /// How the bug was found (user_reported, development, testing, production)
        #[arg(long)]
        source: BugSource,

        /// Priority; defaults to the severity's fix priority
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Do not create a fix task
        #[arg(long)]
        no_fix_task: bool,

        #[command(flatten)]
        details: DraftDetails,
    },

    /// Show a bug with its fix tasks
    Show {
        /// Bug id (e.g., 0003)
        id: String,
    },

    /// List bugs
    List {
        #[command(flatten)]
        filter: ListFilter,
    },

    /// Update bug fields or status
    Update {
        id: String,

        #[command(flatten)]
        fields: UpdateFields,

        /// New severity
        #[arg(long)]
        severity: Option<Severity>,

        /// New source
        #[arg(long)]
        source: Option<BugSource>,
    },

    /// Dependency management
    Deps {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Close a bug without a fix
    Close {
        id: String,

        /// Why the bug is closed without a fix
        #[arg(short, long)]
        reason: String,
    },

    /// Move a closed or failed bug to the archive
    Archive {
        id: String,
    },

    /// Bring an archived bug back
    Restore {
        id: String,
    },

    /// Bug counts per severity, with SLA overdue counts
    Metrics,
}

/// Dependency subcommands
#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Add a dependency (bare id, or task:/bug: prefixed)
    Add { id: String, dep: String },

    /// Remove a dependency
    Rm { id: String, dep: String },

    /// Replace the whole dependency list
    Set {
        id: String,

        /// Dependencies; none clears the list
        deps: Vec<String>,
    },
}

/// Index subcommands
#[derive(Subcommand, Debug)]
pub enum IndexCommands {
    /// Regenerate the Master Index from the records
    Sync {
        /// Only this collection (tasks or bugs)
        #[arg(long)]
        collection: Option<Collection>,
    },

    /// Report drift between the Master Index and the records
    Verify {
        /// Only this collection (tasks or bugs)
        #[arg(long)]
        collection: Option<Collection>,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,
}

/// Fields shared by task and bug creation.
#[derive(Args, Debug, Clone, Default)]
pub struct DraftDetails {
    /// Feature area
    #[arg(long)]
    pub feature: Option<String>,

    /// Affected subsystem (repeatable)
    #[arg(long = "subsystem")]
    pub subsystems: Vec<String>,

    /// Dependency id (repeatable)
    #[arg(long = "dep")]
    pub dependencies: Vec<String>,

    /// Objective paragraph of the body
    #[arg(short, long)]
    pub objective: Option<String>,

    /// Acceptance criterion (repeatable)
    #[arg(long = "criterion")]
    pub criteria: Vec<String>,
}

/// Filters shared by task and bug listings.
#[derive(Args, Debug, Clone, Default)]
pub struct ListFilter {
    /// Status filter
    #[arg(short, long)]
    pub status: Option<Status>,

    /// Priority filter
    #[arg(short, long)]
    pub priority: Option<Priority>,

    /// Feature filter
    #[arg(long)]
    pub feature: Option<String>,

    /// Include archived records
    #[arg(short, long)]
    pub all: bool,

    /// Read the Master Index instead of the records
    #[arg(long)]
    pub index: bool,
}

/// Fields shared by task and bug updates.
#[derive(Args, Debug, Clone, Default)]
pub struct UpdateFields {
    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<Priority>,

    /// Feature area ("" clears)
    #[arg(long)]
    pub feature: Option<String>,

    /// Replace the subsystems (repeatable)
    #[arg(long = "subsystem")]
    pub subsystems: Vec<String>,

    /// Clear the subsystems
    #[arg(long, conflicts_with = "subsystems")]
    pub clear_subsystems: bool,

    /// Replace the body
    #[arg(long)]
    pub body: Option<String>,

    /// Move to a new status
    #[arg(long)]
    pub status: Option<Status>,

    /// Reason recorded with a failed status
    #[arg(long, requires = "status")]
    pub reason: Option<String>,
}
