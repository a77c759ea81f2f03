//! Workbook CLI entry point.

use std::env;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use workbook::action_log;
use workbook::cli::{
    BugCommands, Cli, Commands, ConfigCommands, DepCommands, DraftDetails, IndexCommands,
    ListFilter, TaskCommands, UpdateFields,
};
use workbook::commands::{self, Context, Output};
use workbook::config::resolver::DEFAULT_LOG_LEVEL;
use workbook::config::schema::find_workbook_root;
use workbook::config::{resolve_config, ConfigOverrides, OutputFormat};
use workbook::models::{body, Collection, RecordKind, TaskKind};
use workbook::storage::index::IndexFilter;
use workbook::storage::{BugDraft, RecordFilter, RecordUpdate, TaskDraft};

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    // Determine root: --root flag > WB_ROOT env > nearest .workbook above cwd > cwd
    let root = resolve_root(cli.root.clone(), human);

    let config = match resolve_config(&root, &overrides_for(&cli)) {
        Ok(config) => config,
        Err(e) => {
            init_logging(DEFAULT_LOG_LEVEL);
            fail(&e.to_string(), human);
        }
    };
    init_logging(config.log_level());
    let human = human || config.output_format() == OutputFormat::Human;

    let (cmd_name, args_json) = serialize_command(&cli.command);
    let start = Instant::now();

    let ctx = Context::new(root, config);
    let result = run_command(cli.command, &ctx, human);

    let duration = start.elapsed().as_millis() as u64;
    let error = result.as_ref().err().map(|e| e.to_string());
    action_log::log_action(
        &ctx.root,
        ctx.config.action_log_enabled(),
        &cmd_name,
        args_json,
        error,
        duration,
    );

    if let Err(e) = result {
        fail(&e.to_string(), human);
    }
}

/// Print an error and exit with status 1.
fn fail(message: &str, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", message);
    } else {
        eprintln!("{}", serde_json::json!({ "error": message }));
    }
    process::exit(1);
}

/// Diagnostics go to stderr so stdout stays parseable.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve the workbook root from an explicit path or by searching upward.
///
/// An explicit path (via -C/--root or WB_ROOT) must exist and is used
/// literally. Otherwise the nearest directory holding `.workbook` wins,
/// falling back to the current directory.
fn resolve_root(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => {
            if !path.is_dir() {
                fail(
                    &format!("Specified root does not exist: {}", path.display()),
                    human,
                );
            }
            path
        }
        None => {
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            find_workbook_root(&cwd).unwrap_or(cwd)
        }
    }
}

fn overrides_for(cli: &Cli) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::new();
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    if let Commands::Init {
        tasks_storage,
        bugs_storage,
    } = &cli.command
    {
        if let Some(strategy) = tasks_storage {
            overrides = overrides.with_storage(Collection::Tasks, *strategy);
        }
        if let Some(strategy) = bugs_storage {
            overrides = overrides.with_storage(Collection::Bugs, *strategy);
        }
    }
    overrides
}

fn run_command(command: Commands, ctx: &Context, human: bool) -> Result<(), workbook::Error> {
    match command {
        Commands::Init { .. } => output(&commands::init(ctx)?, human),

        Commands::Task { command } => match command {
            TaskCommands::Create {
                title,
                kind,
                priority,
                parent,
                bug,
                effort,
                details,
            } => {
                let draft = TaskDraft {
                    title,
                    kind,
                    priority,
                    parent_id: parent,
                    dependencies: details.dependencies.clone(),
                    feature: details.feature.clone(),
                    subsystems: details.subsystems.clone(),
                    estimated_effort: effort,
                    bug_reference: bug,
                    body: draft_body(&details),
                    ..Default::default()
                };
                output(&commands::task_create(ctx, draft)?, human);
            }
            TaskCommands::Show { id } => {
                output(&commands::record_show(ctx, Collection::Tasks, &id)?, human)
            }
            TaskCommands::List {
                filter,
                kind,
                parent,
            } => list(ctx, Collection::Tasks, filter, kind, parent, human)?,
            TaskCommands::Update {
                id,
                fields,
                bug,
                effort,
            } => {
                let status = fields.status;
                let reason = fields.reason.clone();
                let mut update = record_update(fields);
                update.bug_reference = bug;
                update.estimated_effort = effort;
                let result = commands::record_update(
                    ctx,
                    Collection::Tasks,
                    &id,
                    update,
                    status,
                    reason.as_deref(),
                )?;
                output(&result, human);
            }
            TaskCommands::Deps { command } => deps(ctx, Collection::Tasks, command, human)?,
            TaskCommands::Ready => output(&commands::ready(ctx, Collection::Tasks)?, human),
            TaskCommands::Blocked => output(&commands::blocked(ctx, Collection::Tasks)?, human),
            TaskCommands::Assess { id } => output(&commands::task_assess(ctx, &id)?, human),
            TaskCommands::Decompose {
                id,
                decision,
                children,
            } => output(
                &commands::task_decompose(ctx, &id, decision, children)?,
                human,
            ),
            TaskCommands::Rollup { id } => output(&commands::task_rollup(ctx, &id)?, human),
            TaskCommands::Archive { id } => {
                output(&commands::archive(ctx, Collection::Tasks, &id)?, human)
            }
            TaskCommands::Restore { id } => {
                output(&commands::restore(ctx, Collection::Tasks, &id)?, human)
            }
            TaskCommands::Import { files } => {
                output(&commands::import(ctx, Collection::Tasks, &files)?, human)
            }
        },

        Commands::Bug { command } => match command {
            BugCommands::Create {
                title,
                severity,
                source,
                priority,
                no_fix_task,
                details,
            } => {
                let mut draft = BugDraft::new(title, severity, source);
                draft.priority = priority;
                draft.dependencies = details.dependencies.clone();
                draft.feature = details.feature.clone();
                draft.subsystems = details.subsystems.clone();
                draft.body = draft_body(&details);
                draft.fix_task = !no_fix_task;
                output(&commands::bug_create(ctx, draft)?, human);
            }
            BugCommands::Show { id } => {
                output(&commands::record_show(ctx, Collection::Bugs, &id)?, human)
            }
            BugCommands::List { filter } => list(ctx, Collection::Bugs, filter, None, None, human)?,
            BugCommands::Update {
                id,
                fields,
                severity,
                source,
            } => {
                let status = fields.status;
                let reason = fields.reason.clone();
                let mut update = record_update(fields);
                update.severity = severity;
                update.source = source;
                let result = commands::record_update(
                    ctx,
                    Collection::Bugs,
                    &id,
                    update,
                    status,
                    reason.as_deref(),
                )?;
                output(&result, human);
            }
            BugCommands::Deps { command } => deps(ctx, Collection::Bugs, command, human)?,
            BugCommands::Close { id, reason } => {
                output(&commands::bug_close(ctx, &id, &reason)?, human)
            }
            BugCommands::Archive { id } => {
                output(&commands::archive(ctx, Collection::Bugs, &id)?, human)
            }
            BugCommands::Restore { id } => {
                output(&commands::restore(ctx, Collection::Bugs, &id)?, human)
            }
            BugCommands::Metrics => output(&commands::bug_metrics(ctx)?, human),
        },

        Commands::Index { command } => match command {
            IndexCommands::Sync { collection } => {
                output(&commands::index_sync(ctx, collection)?, human)
            }
            IndexCommands::Verify { collection } => {
                output(&commands::index_verify(ctx, collection)?, human)
            }
        },

        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(ctx)?, human),
        },

        Commands::Log { limit } => output(&commands::log(&ctx.root, limit)?, human),
    }
    Ok(())
}

fn draft_body(details: &DraftDetails) -> String {
    body::compose(details.objective.as_deref(), &details.criteria)
}

fn record_update(fields: UpdateFields) -> RecordUpdate {
    let subsystems = if fields.clear_subsystems {
        Some(Vec::new())
    } else if fields.subsystems.is_empty() {
        None
    } else {
        Some(fields.subsystems)
    };
    RecordUpdate {
        title: fields.title,
        priority: fields.priority,
        feature: fields.feature,
        subsystems,
        body: fields.body,
        ..Default::default()
    }
}

fn list(
    ctx: &Context,
    collection: Collection,
    filter: ListFilter,
    kind: Option<String>,
    parent: Option<String>,
    human: bool,
) -> Result<(), workbook::Error> {
    if filter.index {
        if filter.feature.is_some() || parent.is_some() {
            return Err(workbook::Error::InvalidInput(
                "--feature and --parent are not available with --index".to_string(),
            ));
        }
        let prefix = match kind {
            Some(kind) => Some(
                RecordKind::Task {
                    kind: kind.parse::<TaskKind>()?,
                    bug_reference: None,
                }
                .type_prefix()
                .to_string(),
            ),
            None => None,
        };
        let filter = IndexFilter {
            status: filter.status,
            priority: filter.priority,
            prefix,
            include_archived: filter.all,
        };
        output(&commands::index_query(ctx, collection, &filter)?, human);
    } else {
        let filter = RecordFilter {
            status: filter.status,
            priority: filter.priority,
            kind,
            feature: filter.feature,
            parent,
            include_archived: filter.all,
        };
        output(&commands::record_list(ctx, collection, &filter)?, human);
    }
    Ok(())
}

fn deps(
    ctx: &Context,
    collection: Collection,
    command: DepCommands,
    human: bool,
) -> Result<(), workbook::Error> {
    let result = match command {
        DepCommands::Add { id, dep } => commands::dep_add(ctx, collection, &id, &dep)?,
        DepCommands::Rm { id, dep } => commands::dep_rm(ctx, collection, &id, &dep)?,
        DepCommands::Set { id, deps } => commands::dep_set(ctx, collection, &id, deps)?,
    };
    output(&result, human);
    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Command name and arguments for the action log.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    match command {
        Commands::Init {
            tasks_storage,
            bugs_storage,
        } => (
            "init".to_string(),
            serde_json::json!({
                "tasks_storage": tasks_storage.map(|s| s.to_string()),
                "bugs_storage": bugs_storage.map(|s| s.to_string()),
            }),
        ),

        Commands::Task { command } => match command {
            TaskCommands::Create {
                title,
                kind,
                priority,
                parent,
                bug,
                effort,
                details,
            } => (
                "task create".to_string(),
                serde_json::json!({
                    "title": title,
                    "kind": kind,
                    "priority": priority,
                    "parent": parent,
                    "bug": bug,
                    "effort": effort,
                    "feature": details.feature,
                    "subsystems": details.subsystems,
                    "dependencies": details.dependencies,
                    "criteria": details.criteria.len(),
                }),
            ),
            TaskCommands::Show { id } => ("task show".to_string(), serde_json::json!({ "id": id })),
            TaskCommands::List {
                filter,
                kind,
                parent,
            } => (
                "task list".to_string(),
                serde_json::json!({
                    "status": filter.status,
                    "priority": filter.priority,
                    "kind": kind,
                    "parent": parent,
                    "all": filter.all,
                    "index": filter.index,
                }),
            ),
            TaskCommands::Update { id, fields, .. } => (
                "task update".to_string(),
                serde_json::json!({ "id": id, "status": fields.status, "title": fields.title }),
            ),
            TaskCommands::Deps { command } => deps_args("task", command),
            TaskCommands::Ready => ("task ready".to_string(), serde_json::json!({})),
            TaskCommands::Blocked => ("task blocked".to_string(), serde_json::json!({})),
            TaskCommands::Assess { id } => {
                ("task assess".to_string(), serde_json::json!({ "id": id }))
            }
            TaskCommands::Decompose {
                id,
                decision,
                children,
            } => (
                "task decompose".to_string(),
                serde_json::json!({ "id": id, "decision": decision, "children": children }),
            ),
            TaskCommands::Rollup { id } => {
                ("task rollup".to_string(), serde_json::json!({ "id": id }))
            }
            TaskCommands::Archive { id } => {
                ("task archive".to_string(), serde_json::json!({ "id": id }))
            }
            TaskCommands::Restore { id } => {
                ("task restore".to_string(), serde_json::json!({ "id": id }))
            }
            TaskCommands::Import { files } => (
                "task import".to_string(),
                serde_json::json!({ "files": files }),
            ),
        },

        Commands::Bug { command } => match command {
            BugCommands::Create {
                title,
                severity,
                source,
                priority,
                no_fix_task,
                ..
            } => (
                "bug create".to_string(),
                serde_json::json!({
                    "title": title,
                    "severity": severity,
                    "source": source,
                    "priority": priority,
                    "no_fix_task": no_fix_task,
                }),
            ),
            BugCommands::Show { id } => ("bug show".to_string(), serde_json::json!({ "id": id })),
            BugCommands::List { filter } => (
                "bug list".to_string(),
                serde_json::json!({
                    "status": filter.status,
                    "priority": filter.priority,
                    "all": filter.all,
                    "index": filter.index,
                }),
            ),
            BugCommands::Update {
                id,
                fields,
                severity,
                ..
            } => (
                "bug update".to_string(),
                serde_json::json!({ "id": id, "status": fields.status, "severity": severity }),
            ),
            BugCommands::Deps { command } => deps_args("bug", command),
            BugCommands::Close { id, reason } => (
                "bug close".to_string(),
                serde_json::json!({ "id": id, "reason": reason }),
            ),
            BugCommands::Archive { id } => {
                ("bug archive".to_string(), serde_json::json!({ "id": id }))
            }
            BugCommands::Restore { id } => {
                ("bug restore".to_string(), serde_json::json!({ "id": id }))
            }
            BugCommands::Metrics => ("bug metrics".to_string(), serde_json::json!({})),
        },

        Commands::Index { command } => match command {
            IndexCommands::Sync { collection } => (
                "index sync".to_string(),
                serde_json::json!({ "collection": collection }),
            ),
            IndexCommands::Verify { collection } => (
                "index verify".to_string(),
                serde_json::json!({ "collection": collection }),
            ),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Show => ("config show".to_string(), serde_json::json!({})),
        },

        Commands::Log { limit } => ("log".to_string(), serde_json::json!({ "limit": limit })),
    }
}

fn deps_args(entity: &str, command: &DepCommands) -> (String, serde_json::Value) {
    match command {
        DepCommands::Add { id, dep } => (
            format!("{} deps add", entity),
            serde_json::json!({ "id": id, "dep": dep }),
        ),
        DepCommands::Rm { id, dep } => (
            format!("{} deps rm", entity),
            serde_json::json!({ "id": id, "dep": dep }),
        ),
        DepCommands::Set { id, deps } => (
            format!("{} deps set", entity),
            serde_json::json!({ "id": id, "deps": deps }),
        ),
    }
}
