//! Core logic for taskline: a live, sectioned personal task list.
//! This crate owns the task model, the SQLite record store, and the
//! partition engine that keeps the sectioned view in sync with the store.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, CoreConfig};
pub use logging::{
    default_log_level, init_logging, logging_status, LogConfig, LogLevel, LoggingError,
};
pub use model::section::{classify, Section, NEXT_SEVEN_DAYS_SPAN};
pub use model::task::{TaskId, TaskRecord, TaskValidationError};
pub use repo::task_repo::{RepoError, RepoResult, SqliteTaskRepository, TaskQuery, TaskRepository};
pub use repo::watch::{QueryChange, QuerySubscription};
pub use service::partition::{Partition, PartitionSection, RowPath};
pub use service::partition_diff::{diff_partitions, RowDiff};
pub use service::partition_engine::{
    EngineError, EngineResult, PartitionChangeEvent, PartitionChangeKind, PartitionEngine,
    PartitionListener, TaskFilter,
};
pub use service::task_presenter::{format_day, TaskPresenter, TaskProjection};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
