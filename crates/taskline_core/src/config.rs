//! Runtime configuration for hosts embedding the core.
//!
//! # Responsibility
//! - Read database and logging settings from the environment.
//! - Open the configured task store.
//!
//! # Invariants
//! - A missing database path selects an in-memory database.
//! - Logging is configured only when a log directory is given.

use crate::db::{open_db, open_db_in_memory};
use crate::logging::{default_log_level, LogConfig, LoggingError};
use crate::repo::task_repo::{RepoResult, SqliteTaskRepository};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "TASKLINE_DB";
pub const ENV_LOG_LEVEL: &str = "TASKLINE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKLINE_LOG_DIR";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Logging(LoggingError),
    EmptyValue(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(err) => write!(f, "{err}"),
            Self::EmptyValue(key) => write!(f, "`{key}` is set but empty"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(err) => Some(err),
            Self::EmptyValue(_) => None,
        }
    }
}

impl From<LoggingError> for ConfigError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

/// Database and logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreConfig {
    /// SQLite file; `None` means in-memory.
    pub db_path: Option<PathBuf>,
    pub log: Option<LogConfig>,
}

impl CoreConfig {
    /// Reads `TASKLINE_DB`, `TASKLINE_LOG_LEVEL` and `TASKLINE_LOG_DIR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = match lookup(ENV_DB_PATH) {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(ENV_DB_PATH))
            }
            Some(value) => Some(PathBuf::from(value.trim())),
            None => None,
        };

        let log = match lookup(ENV_LOG_DIR) {
            Some(dir) => {
                let level = lookup(ENV_LOG_LEVEL)
                    .unwrap_or_else(|| default_log_level().as_str().to_string());
                Some(LogConfig::parse(&level, &dir)?)
            }
            None => None,
        };

        Ok(Self { db_path, log })
    }

    /// Opens and migrates the configured database.
    pub fn open_repository(&self) -> RepoResult<SqliteTaskRepository> {
        let conn = match self.db_path.as_ref() {
            Some(path) => open_db(path)?,
            None => open_db_in_memory()?,
        };
        SqliteTaskRepository::try_new(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, ENV_DB_PATH, ENV_LOG_DIR, ENV_LOG_LEVEL};
    use crate::logging::LogLevel;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_means_in_memory_without_logging() {
        let config = CoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert!(config.open_repository().is_ok());
    }

    #[test]
    fn reads_database_and_log_settings() {
        let config = CoreConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, " /tmp/tasks.db "),
            (ENV_LOG_DIR, "/tmp/taskline-logs"),
            (ENV_LOG_LEVEL, "WARN"),
        ]))
        .unwrap();

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/tasks.db")));
        let log = config.log.unwrap();
        assert_eq!(log.level, LogLevel::Warn);
        assert_eq!(log.dir, PathBuf::from("/tmp/taskline-logs"));
    }

    #[test]
    fn rejects_blank_database_path_and_relative_log_dir() {
        assert_eq!(
            CoreConfig::from_lookup(lookup(&[(ENV_DB_PATH, "  ")])),
            Err(ConfigError::EmptyValue(ENV_DB_PATH))
        );
        assert!(matches!(
            CoreConfig::from_lookup(lookup(&[(ENV_LOG_DIR, "relative/logs")])),
            Err(ConfigError::Logging(_))
        ));
    }
}
