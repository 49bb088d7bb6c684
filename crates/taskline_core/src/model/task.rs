//! Task record domain model.
//!
//! # Responsibility
//! - Define the persisted task entity shared by store, engine and presenter.
//! - Provide validation and completion-state helpers.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `name` is non-empty after trimming.
//! - `date_completed` is set only while `is_complete` is true.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a task record.
pub type TaskId = Uuid;

/// Persisted task entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Primary key; the only lookup key for updates and deletes.
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_complete: bool,
    /// Due day. Rows written by older schema variants may lack it.
    pub date_to_complete: Option<NaiveDate>,
    /// Completion instant, `None` renders as "TBD".
    pub date_completed: Option<DateTime<Utc>>,
}

/// Validation failures for task writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Name is empty or whitespace-only.
    EmptyName,
    /// Incomplete task carries a completion timestamp.
    CompletionDateWithoutCompletion,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "task name cannot be empty"),
            Self::CompletionDateWithoutCompletion => {
                write!(f, "date_completed requires is_complete=true")
            }
        }
    }
}

impl Error for TaskValidationError {}

impl TaskRecord {
    /// Creates an incomplete task with a generated id.
    ///
    /// The name is trimmed; call `validate()` before persisting.
    pub fn new(
        name: impl AsRef<str>,
        description: impl Into<String>,
        date_to_complete: Option<NaiveDate>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), name, description, date_to_complete)
    }

    /// Creates an incomplete task with a caller-provided id.
    pub fn with_id(
        id: TaskId,
        name: impl AsRef<str>,
        description: impl Into<String>,
        date_to_complete: Option<NaiveDate>,
    ) -> Self {
        Self {
            id,
            name: name.as_ref().trim().to_string(),
            description: description.into(),
            is_complete: false,
            date_to_complete,
            date_completed: None,
        }
    }

    /// Checks write-path invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.name.trim().is_empty() {
            return Err(TaskValidationError::EmptyName);
        }
        if !self.is_complete && self.date_completed.is_some() {
            return Err(TaskValidationError::CompletionDateWithoutCompletion);
        }
        Ok(())
    }

    /// Flips completion state.
    ///
    /// Completing stamps `now`; un-completing clears the stamp so the
    /// completed-date projection falls back to "TBD".
    pub fn toggle_complete(&mut self, now: DateTime<Utc>) {
        self.is_complete = !self.is_complete;
        self.date_completed = if self.is_complete { Some(now) } else { None };
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskRecord, TaskValidationError};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn due() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2026, 10, 19)
    }

    #[test]
    fn new_trims_name_and_starts_incomplete() {
        let task = TaskRecord::new("  Buy milk ", "", due());
        assert_eq!(task.name, "Buy milk");
        assert!(!task.is_complete);
        assert!(task.date_completed.is_none());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_name() {
        let task = TaskRecord::new(" \t ", "", due());
        assert_eq!(task.validate(), Err(TaskValidationError::EmptyName));
    }

    #[test]
    fn toggle_stamps_and_clears_completion_date() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
        let mut task = TaskRecord::new("Write report", "", due());

        task.toggle_complete(now);
        assert!(task.is_complete);
        assert_eq!(task.date_completed, Some(now));

        task.toggle_complete(now);
        assert!(!task.is_complete);
        assert!(task.date_completed.is_none());
        assert!(task.validate().is_ok());
    }

    #[test]
    fn validate_rejects_stale_completion_date() {
        let mut task = TaskRecord::new("Stale", "", due());
        task.date_completed = Some(Utc::now());
        assert_eq!(
            task.validate(),
            Err(TaskValidationError::CompletionDateWithoutCompletion)
        );
    }
}
