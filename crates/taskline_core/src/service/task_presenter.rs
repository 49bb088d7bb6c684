//! Display projection for task records.
//!
//! # Responsibility
//! - Format due and completion dates for list and detail views.
//! - Never mutate the underlying record.

use crate::clock::Clock;
use crate::model::section::Section;
use crate::model::task::{TaskId, TaskRecord};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

/// Label for a missing completion date.
pub const COMPLETION_PENDING_LABEL: &str = "TBD";
/// Detail-view placeholder for an empty description.
pub const EMPTY_DESCRIPTION_LABEL: &str = "No description";

/// Read-only, display-formatted view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskProjection {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub is_complete: bool,
    pub date_to_complete: String,
    pub date_completed: String,
}

impl TaskProjection {
    /// Description for the detail view, with the empty-text placeholder.
    pub fn detail_description(&self) -> &str {
        if self.description.is_empty() {
            EMPTY_DESCRIPTION_LABEL
        } else {
            &self.description
        }
    }
}

/// Formats a day as `Today, Oct 19, 2026` or `Monday, Oct 19, 2026`.
pub fn format_day(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        date.format("Today, %b %-d, %Y").to_string()
    } else {
        date.format("%A, %b %-d, %Y").to_string()
    }
}

/// Projects records against one reference instant.
#[derive(Debug, Clone, Copy)]
pub struct TaskPresenter {
    now: DateTime<FixedOffset>,
}

impl TaskPresenter {
    pub fn new(clock: &impl Clock) -> Self {
        Self { now: clock.now() }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn project(&self, task: &TaskRecord) -> TaskProjection {
        TaskProjection {
            id: task.id,
            name: task.name.clone(),
            description: task.description.clone(),
            is_complete: task.is_complete,
            date_to_complete: self.due_label(task.date_to_complete),
            date_completed: self.completed_label(task.date_completed),
        }
    }

    /// Missing due days render as today.
    pub fn due_label(&self, date: Option<NaiveDate>) -> String {
        format_day(date.unwrap_or_else(|| self.today()), self.today())
    }

    pub fn completed_label(&self, completed_at: Option<DateTime<Utc>>) -> String {
        match completed_at {
            Some(at) => {
                let local_day = at.with_timezone(self.now.offset()).date_naive();
                format_day(local_day, self.today())
            }
            None => COMPLETION_PENDING_LABEL.to_string(),
        }
    }

    /// Section header text. The `Today` header carries the date.
    pub fn section_title(&self, section: Section) -> String {
        match section {
            Section::Today => format_day(self.today(), self.today()),
            other => other.label().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_day, TaskPresenter, COMPLETION_PENDING_LABEL};
    use crate::clock::FixedClock;
    use crate::model::section::Section;
    use crate::model::task::TaskRecord;
    use chrono::{DateTime, NaiveDate};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn format_day_marks_today() {
        assert_eq!(format_day(day(19), day(19)), "Today, Oct 19, 2026");
        assert_eq!(format_day(day(20), day(19)), "Tuesday, Oct 20, 2026");
        assert_eq!(format_day(day(5), day(19)), "Monday, Oct 5, 2026");
    }

    #[test]
    fn projection_uses_placeholders() {
        let presenter = TaskPresenter::new(&FixedClock::at_day(day(19)));
        let projection = presenter.project(&TaskRecord::new("Buy milk", "", None));

        assert_eq!(projection.date_to_complete, "Today, Oct 19, 2026");
        assert_eq!(projection.date_completed, COMPLETION_PENDING_LABEL);
        assert_eq!(projection.detail_description(), "No description");
    }

    #[test]
    fn completion_date_uses_clock_offset() {
        let now = DateTime::parse_from_rfc3339("2026-10-19T20:00:00-05:00").unwrap();
        let presenter = TaskPresenter::new(&FixedClock::new(now));
        // 01:00 UTC on the 20th is still the evening of the 19th at -05:00.
        let completed = DateTime::parse_from_rfc3339("2026-10-20T01:00:00Z")
            .unwrap()
            .to_utc();
        assert_eq!(
            presenter.completed_label(Some(completed)),
            "Today, Oct 19, 2026"
        );
    }

    #[test]
    fn section_titles() {
        let presenter = TaskPresenter::new(&FixedClock::at_day(day(19)));
        assert_eq!(presenter.section_title(Section::Today), "Today, Oct 19, 2026");
        assert_eq!(presenter.section_title(Section::Older), "Older");
    }
}
