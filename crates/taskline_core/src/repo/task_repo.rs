//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, primary-key lookup and filtered/sorted queries over
//!   the `tasks` table.
//! - Notify live query subscriptions after every committed write.
//!
//! # Invariants
//! - Write paths call `TaskRecord::validate()` before SQL mutations.
//! - Read paths reject malformed persisted rows instead of masking them.
//! - Query results are ordered by `date_to_complete DESC, rowid ASC`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::task::{TaskId, TaskRecord, TaskValidationError};
use crate::repo::watch::{QuerySubscription, SharedWatchRegistry, WatchRegistry};
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error};
use regex::{Regex, RegexBuilder};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    description,
    is_complete,
    date_to_complete,
    date_completed
FROM tasks";

const DAY_FORMAT: &str = "%Y-%m-%d";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-level error for task persistence, queries and subscriptions.
#[derive(Debug)]
pub enum RepoError {
    Validation(TaskValidationError),
    Db(DbError),
    NotFound(TaskId),
    InvalidData(String),
    InvalidQuery(String),
    /// Store cannot serve requests (schema mismatch, poisoned connection).
    Unavailable(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::InvalidQuery(message) => write!(f, "invalid task query: {message}"),
            Self::Unavailable(message) => write!(f, "task store unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Filter for task queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    pub is_complete: bool,
    /// Case-insensitive substring match on `name`.
    pub name_contains: Option<String>,
}

impl TaskQuery {
    /// Incomplete tasks.
    pub fn open() -> Self {
        Self::default()
    }

    /// Completed tasks.
    pub fn completed() -> Self {
        Self {
            is_complete: true,
            name_contains: None,
        }
    }

    /// Adds a name filter. Blank text clears it.
    pub fn with_search(mut self, text: Option<&str>) -> Self {
        self.name_contains = text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        self
    }

    fn name_matcher(&self) -> RepoResult<Option<Regex>> {
        let Some(needle) = self.name_contains.as_deref() else {
            return Ok(None);
        };
        RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(true)
            .build()
            .map(Some)
            .map_err(|err| RepoError::InvalidQuery(err.to_string()))
    }
}

/// Record store interface consumed by the partition engine.
pub trait TaskRepository {
    /// Runs a filtered query sorted by due day, latest first.
    fn query_tasks(&self, query: &TaskQuery) -> RepoResult<Vec<TaskRecord>>;
    /// Inserts a new task and returns its id.
    fn insert_task(&self, task: &TaskRecord) -> RepoResult<TaskId>;
    /// Applies `mutator` to the stored task and persists the result.
    fn update_task<F>(&self, id: TaskId, mutator: F) -> RepoResult<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord);
    /// Hard-deletes a task.
    fn delete_task(&self, id: TaskId) -> RepoResult<()>;
    /// Primary-key lookup.
    fn find_task(&self, id: TaskId) -> RepoResult<Option<TaskRecord>>;
    /// Opens a live subscription; the first message is `Initial`.
    fn observe(&self, query: TaskQuery) -> RepoResult<QuerySubscription>;
}

struct StoreState {
    conn: Connection,
    /// Last seen `PRAGMA data_version`, bumped by commits from other connections.
    data_version: i64,
}

/// SQLite-backed task repository.
///
/// Cloning yields another handle to the same connection and subscription
/// registry, so every writer sharing it notifies every live query.
#[derive(Clone)]
pub struct SqliteTaskRepository {
    state: Arc<Mutex<StoreState>>,
    watchers: SharedWatchRegistry,
}

impl SqliteTaskRepository {
    /// Wraps a migrated connection.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_task_connection_ready(&conn)?;
        let data_version = read_data_version(&conn)?;
        Ok(Self {
            state: Arc::new(Mutex::new(StoreState { conn, data_version })),
            watchers: WatchRegistry::shared(),
        })
    }

    /// Number of live subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.watchers
            .lock()
            .map(|registry| registry.len())
            .unwrap_or_default()
    }

    /// Notifies subscriptions when another connection committed to the file.
    ///
    /// Returns whether an external change was detected.
    pub fn poll_external_changes(&self) -> RepoResult<bool> {
        let mut state = self.lock_state()?;
        let current = read_data_version(&state.conn)?;
        if current == state.data_version {
            return Ok(false);
        }
        state.data_version = current;
        debug!("event=store_external_change module=repo status=ok data_version={current}");
        self.notify_watchers(&state.conn);
        Ok(true)
    }

    fn lock_state(&self) -> RepoResult<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| {
            error!("event=store_lock module=repo status=error error_code=lock_poisoned");
            RepoError::Unavailable("connection lock poisoned".to_string())
        })
    }

    fn notify_watchers(&self, conn: &Connection) {
        match self.watchers.lock() {
            Ok(mut registry) => registry.notify(|query| select_tasks(conn, query)),
            Err(_) => {
                error!("event=watch_notify module=repo status=error error_code=lock_poisoned");
            }
        }
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn query_tasks(&self, query: &TaskQuery) -> RepoResult<Vec<TaskRecord>> {
        let state = self.lock_state()?;
        select_tasks(&state.conn, query)
    }

    fn insert_task(&self, task: &TaskRecord) -> RepoResult<TaskId> {
        task.validate()?;

        let state = self.lock_state()?;
        state.conn.execute(
            "INSERT INTO tasks (
                uuid,
                name,
                description,
                is_complete,
                date_to_complete,
                date_completed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                task.id.to_string(),
                task.name.as_str(),
                task.description.as_str(),
                bool_to_int(task.is_complete),
                task.date_to_complete.map(day_to_db),
                task.date_completed.map(|at| at.timestamp_millis()),
            ],
        )?;
        debug!("event=task_insert module=repo status=ok");

        self.notify_watchers(&state.conn);
        Ok(task.id)
    }

    fn update_task<F>(&self, id: TaskId, mutator: F) -> RepoResult<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let state = self.lock_state()?;
        let mut task = select_task(&state.conn, id)?.ok_or(RepoError::NotFound(id))?;
        mutator(&mut task);
        // Primary key is immutable.
        task.id = id;
        task.validate()?;

        let changed = state.conn.execute(
            "UPDATE tasks
             SET
                name = ?1,
                description = ?2,
                is_complete = ?3,
                date_to_complete = ?4,
                date_completed = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?6;",
            params![
                task.name.as_str(),
                task.description.as_str(),
                bool_to_int(task.is_complete),
                task.date_to_complete.map(day_to_db),
                task.date_completed.map(|at| at.timestamp_millis()),
                id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        debug!("event=task_update module=repo status=ok");

        self.notify_watchers(&state.conn);
        Ok(task)
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<()> {
        let state = self.lock_state()?;
        let changed = state
            .conn
            .execute("DELETE FROM tasks WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        debug!("event=task_delete module=repo status=ok");

        self.notify_watchers(&state.conn);
        Ok(())
    }

    fn find_task(&self, id: TaskId) -> RepoResult<Option<TaskRecord>> {
        let state = self.lock_state()?;
        select_task(&state.conn, id)
    }

    fn observe(&self, query: TaskQuery) -> RepoResult<QuerySubscription> {
        let state = self.lock_state()?;
        let snapshot = select_tasks(&state.conn, &query)?;
        Ok(WatchRegistry::register(&self.watchers, query, snapshot))
    }
}

fn select_tasks(conn: &Connection, query: &TaskQuery) -> RepoResult<Vec<TaskRecord>> {
    let matcher = query.name_matcher()?;
    let mut stmt = conn.prepare_cached(&format!(
        "{TASK_SELECT_SQL}
         WHERE is_complete = ?1
         ORDER BY date_to_complete DESC, rowid ASC;"
    ))?;
    let mut rows = stmt.query([bool_to_int(query.is_complete)])?;

    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        let task = parse_task_row(row)?;
        if matcher
            .as_ref()
            .map_or(true, |matcher| matcher.is_match(&task.name))
        {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

fn select_task(conn: &Connection, id: TaskId) -> RepoResult<Option<TaskRecord>> {
    let mut stmt = conn.prepare_cached(&format!("{TASK_SELECT_SQL} WHERE uuid = ?1;"))?;
    let row = stmt
        .query_row([id.to_string()], |row| Ok(parse_task_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<TaskRecord> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in tasks.uuid"))
    })?;

    let is_complete = match row.get::<_, i64>("is_complete")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_complete value `{other}` in tasks.is_complete"
            )));
        }
    };

    let date_to_complete = match row.get::<_, Option<String>>("date_to_complete")? {
        Some(text) => Some(NaiveDate::parse_from_str(&text, DAY_FORMAT).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid day `{text}` in tasks.date_to_complete"
            ))
        })?),
        None => None,
    };

    let date_completed = match row.get::<_, Option<i64>>("date_completed")? {
        Some(millis) => Some(DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "out of range timestamp `{millis}` in tasks.date_completed"
            ))
        })?),
        None => None,
    };

    Ok(TaskRecord {
        id,
        name: row.get("name")?,
        description: row.get("description")?,
        is_complete,
        date_to_complete,
        date_completed,
    })
}

fn ensure_task_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::Unavailable(format!(
            "connection schema version {actual_version} does not match {expected_version}; open it with db::open_db"
        )));
    }
    Ok(())
}

fn read_data_version(conn: &Connection) -> RepoResult<i64> {
    Ok(conn.query_row("PRAGMA data_version;", [], |row| row.get(0))?)
}

fn day_to_db(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::{SqliteTaskRepository, TaskQuery, TaskRepository};
    use crate::db::open_db_in_memory;
    use crate::model::task::TaskRecord;
    use chrono::NaiveDate;
    use rusqlite::Connection;

    #[test]
    fn with_search_drops_blank_text() {
        assert_eq!(TaskQuery::open().with_search(Some("   ")).name_contains, None);
        assert_eq!(
            TaskQuery::open().with_search(Some(" milk ")).name_contains.as_deref(),
            Some("milk")
        );
    }

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(SqliteTaskRepository::try_new(conn).is_err());
    }

    #[test]
    fn search_is_case_insensitive_and_literal() {
        let repo = SqliteTaskRepository::try_new(open_db_in_memory().unwrap()).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19);
        repo.insert_task(&TaskRecord::new("Buy MILK", "", day)).unwrap();
        repo.insert_task(&TaskRecord::new("Call mom (urgent)", "", day)).unwrap();

        let hits = repo
            .query_tasks(&TaskQuery::open().with_search(Some("milk")))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Buy MILK");

        let literal = repo
            .query_tasks(&TaskQuery::open().with_search(Some("(URGENT)")))
            .unwrap();
        assert_eq!(literal.len(), 1);
    }
}
