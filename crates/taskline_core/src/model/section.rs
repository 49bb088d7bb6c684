//! Display sections and the due-date classifier.
//!
//! # Invariants
//! - Section iteration order is fixed: `Older`, `Today`, `NextSevenDays`,
//!   `Upcoming`. `Ord` follows the same order.
//! - `classify` is total; every optional date maps to exactly one section.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Inclusive upper bound of `NextSevenDays`, counted in days after today.
///
/// Built as tomorrow plus seven more days, so the window covers
/// `today + 1 ..= today + 8`.
pub const NEXT_SEVEN_DAYS_SPAN: u64 = 1 + 7;

/// Due-date bucket used to group tasks for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Older,
    Today,
    NextSevenDays,
    Upcoming,
}

impl Section {
    /// All sections in display order.
    pub const ALL: [Section; 4] = [
        Section::Older,
        Section::Today,
        Section::NextSevenDays,
        Section::Upcoming,
    ];

    /// Fixed display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Older => "Older",
            Self::Today => "Today",
            Self::NextSevenDays => "Next 7 Days",
            Self::Upcoming => "Upcoming",
        }
    }
}

/// Buckets a due date relative to `today` (a calendar day, already normalized).
///
/// An absent due date is treated as due today.
pub fn classify(date_to_complete: Option<NaiveDate>, today: NaiveDate) -> Section {
    let date = date_to_complete.unwrap_or(today);
    if date < today {
        return Section::Older;
    }
    if date == today {
        return Section::Today;
    }
    match today.checked_add_days(Days::new(NEXT_SEVEN_DAYS_SPAN)) {
        Some(boundary) if date <= boundary => Section::NextSevenDays,
        // `today + 8` overflowing the calendar means nothing lies beyond the window.
        None => Section::NextSevenDays,
        Some(_) => Section::Upcoming,
    }
}
