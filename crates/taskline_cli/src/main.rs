//! Command-line view binding for the task partition engine.
//!
//! # Responsibility
//! - Map subcommands onto engine commands and queries.
//! - Render the sectioned list as text or JSON.
//!
//! # Invariants
//! - A stale task id is reported, not treated as a failure.
//! - Every invocation opens the store, runs one command and exits.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;
use taskline_core::{
    core_version, init_logging, Clock, ConfigError, CoreConfig, EngineError, LoggingError,
    PartitionEngine, RepoError, SqliteTaskRepository, SystemClock, TaskId, TaskProjection,
};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Sectioned personal task list backed by SQLite.
#[derive(Parser)]
#[command(name = "taskline", version, about)]
struct Cli {
    /// SQLite database file. Overrides `TASKLINE_DB`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a task.
    Add {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Due day as YYYY-MM-DD; defaults to today.
        #[arg(long, value_parser = parse_day)]
        due: Option<NaiveDate>,
    },
    /// Print tasks grouped into sections.
    List {
        /// Show completed tasks instead of open ones.
        #[arg(long)]
        completed: bool,
        /// Case-insensitive name filter.
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Toggle completion.
    Done { id: TaskId },
    /// Delete a task.
    Rm { id: TaskId },
    /// Print task details.
    Show { id: TaskId },
    /// Print the core version.
    Version,
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Logging(LoggingError),
    Store(RepoError),
    Engine(EngineError),
    Output(serde_json::Error),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Engine(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "failed to render output: {err}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Engine(err) => Some(err),
            Self::Output(err) => Some(err),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for CliError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<RepoError> for CliError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

impl From<EngineError> for CliError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Output(value)
    }
}

type Engine = PartitionEngine<SqliteTaskRepository>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Engine(EngineError::NotFound(id))) => {
            println!("task {id} no longer exists; nothing to do");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("taskline: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Version = cli.command {
        println!("taskline_core version={}", core_version());
        return Ok(());
    }

    let mut config = CoreConfig::from_env()?;
    if let Some(path) = cli.db {
        config.db_path = Some(path);
    }
    if let Some(log) = config.log.as_ref() {
        init_logging(log)?;
    }

    let mut engine = PartitionEngine::new(config.open_repository()?);
    info!("event=cli_command module=cli status=start");

    match cli.command {
        Command::Add {
            name,
            description,
            due,
        } => {
            let due = due.unwrap_or_else(|| SystemClock.today());
            let id = engine.create_task(&name, &description, due)?;
            println!("{id}");
        }
        Command::List {
            completed,
            search,
            json,
        } => {
            engine.set_filter(completed, search.as_deref())?;
            if json {
                print_json(&engine)?;
            } else {
                print_sections(&engine);
            }
        }
        Command::Done { id } => {
            let task = engine.toggle_complete(id)?;
            let state = if task.is_complete { "complete" } else { "open" };
            println!("{id} {state}");
        }
        Command::Rm { id } => {
            engine.delete_task(id)?;
            println!("{id} deleted");
        }
        Command::Show { id } => print_detail(&engine.task(id)?),
        Command::Version => {}
    }

    engine.close();
    info!("event=cli_command module=cli status=ok");
    Ok(())
}

fn parse_day(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DAY_FORMAT)
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn print_sections(engine: &Engine) {
    if engine.section_count() == 0 {
        println!("No tasks.");
        return;
    }
    for section in 0..engine.section_count() {
        if let Some(title) = engine.title(section) {
            println!("{title}");
        }
        for row in 0..engine.row_count(section) {
            if let Some(item) = engine.item(section, row) {
                let mark = if item.is_complete { 'x' } else { ' ' };
                println!("  [{mark}] {}  {}  ({})", item.id, item.name, item.date_to_complete);
            }
        }
    }
}

fn print_json(engine: &Engine) -> Result<(), CliError> {
    let sections: Vec<serde_json::Value> = engine
        .current_partition()
        .sections()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let items: Vec<TaskProjection> = (0..entry.tasks.len())
                .filter_map(|row| engine.item(index, row))
                .collect();
            serde_json::json!({
                "section": entry.section,
                "title": engine.title(index),
                "tasks": items,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&sections)?);
    Ok(())
}

fn print_detail(task: &TaskProjection) {
    println!("{}", task.name);
    println!("  id:          {}", task.id);
    println!("  description: {}", task.detail_description());
    println!("  due:         {}", task.date_to_complete);
    println!("  completed:   {}", task.date_completed);
}
