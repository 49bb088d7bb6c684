//! Row-level change description between two partitions.
//!
//! # Responsibility
//! - Compare partitions section by section, keyed by task id.
//! - Produce the small change set a list widget can animate.
//!
//! # Invariants
//! - `removed` and `sections_removed` use previous-partition coordinates.
//! - `inserted`, `updated`, `sections_inserted` and `sections_reloaded` use
//!   current-partition coordinates.
//! - A section with more than one row change is reported once in
//!   `sections_reloaded` and contributes no row entries.

use crate::model::section::Section;
use crate::model::task::{TaskId, TaskRecord};
use crate::service::partition::{Partition, RowPath};
use serde::Serialize;
use std::collections::HashMap;

/// Change set between two partition snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowDiff {
    pub inserted: Vec<RowPath>,
    pub updated: Vec<RowPath>,
    pub removed: Vec<RowPath>,
    pub sections_inserted: Vec<usize>,
    pub sections_removed: Vec<usize>,
    pub sections_reloaded: Vec<usize>,
}

impl RowDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.sections_inserted.is_empty()
            && self.sections_removed.is_empty()
            && self.sections_reloaded.is_empty()
    }
}

/// Diffs `previous` against `current`.
pub fn diff_partitions(previous: &Partition, current: &Partition) -> RowDiff {
    let mut diff = RowDiff::default();

    for section in Section::ALL {
        match (previous.index_of(section), current.index_of(section)) {
            (None, None) => {}
            (None, Some(new_index)) => diff.sections_inserted.push(new_index),
            (Some(old_index), None) => {
                let rows = previous.row_count(old_index);
                diff.removed
                    .extend((0..rows).map(|row| RowPath::new(old_index, row)));
                diff.sections_removed.push(old_index);
            }
            (Some(old_index), Some(new_index)) => {
                let changes = SectionChanges::between(
                    previous.tasks_in(section),
                    current.tasks_in(section),
                );
                match changes.count() {
                    0 => {}
                    1 if !changes.reordered => {
                        diff.removed.extend(
                            changes
                                .removed
                                .iter()
                                .map(|row| RowPath::new(old_index, *row)),
                        );
                        diff.inserted.extend(
                            changes
                                .inserted
                                .iter()
                                .map(|row| RowPath::new(new_index, *row)),
                        );
                        diff.updated.extend(
                            changes
                                .updated
                                .iter()
                                .map(|row| RowPath::new(new_index, *row)),
                        );
                    }
                    _ => diff.sections_reloaded.push(new_index),
                }
            }
        }
    }

    diff
}

#[derive(Debug, Default)]
struct SectionChanges {
    removed: Vec<usize>,
    inserted: Vec<usize>,
    updated: Vec<usize>,
    reordered: bool,
}

impl SectionChanges {
    fn between(previous: &[TaskRecord], current: &[TaskRecord]) -> Self {
        let previous_by_id: HashMap<TaskId, &TaskRecord> =
            previous.iter().map(|task| (task.id, task)).collect();
        let current_by_id: HashMap<TaskId, &TaskRecord> =
            current.iter().map(|task| (task.id, task)).collect();

        let mut changes = Self::default();
        for (row, task) in previous.iter().enumerate() {
            if !current_by_id.contains_key(&task.id) {
                changes.removed.push(row);
            }
        }
        for (row, task) in current.iter().enumerate() {
            match previous_by_id.get(&task.id) {
                None => changes.inserted.push(row),
                Some(before) if *before != task => changes.updated.push(row),
                Some(_) => {}
            }
        }

        let survivors_before = previous
            .iter()
            .filter(|task| current_by_id.contains_key(&task.id))
            .map(|task| task.id);
        let survivors_after = current
            .iter()
            .filter(|task| previous_by_id.contains_key(&task.id))
            .map(|task| task.id);
        changes.reordered = survivors_before.ne(survivors_after);

        changes
    }

    fn count(&self) -> usize {
        let moved = usize::from(self.reordered);
        self.removed.len() + self.inserted.len() + self.updated.len() + moved
    }
}

#[cfg(test)]
mod tests {
    use super::{diff_partitions, RowDiff};
    use crate::model::task::TaskRecord;
    use crate::service::partition::{Partition, RowPath};
    use chrono::{Days, NaiveDate};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn due_in(name: &str, days: u64) -> TaskRecord {
        TaskRecord::new(name, "", today().checked_add_days(Days::new(days)))
    }

    fn build(tasks: &[TaskRecord]) -> Partition {
        Partition::build(tasks.to_vec(), today())
    }

    #[test]
    fn identical_partitions_yield_empty_diff() {
        let tasks = vec![due_in("a", 0), due_in("b", 3)];
        assert!(diff_partitions(&build(&tasks), &build(&tasks)).is_empty());
    }

    #[test]
    fn single_insert_into_existing_section_is_a_row_insert() {
        let a = due_in("a", 3);
        let b = due_in("b", 2);
        let diff = diff_partitions(&build(&[a.clone()]), &build(&[a, b]));
        assert_eq!(
            diff,
            RowDiff {
                inserted: vec![RowPath::new(0, 1)],
                ..RowDiff::default()
            }
        );
    }

    #[test]
    fn first_row_of_a_section_inserts_the_section() {
        let upcoming = due_in("far", 12);
        let today_task = due_in("now", 0);
        let diff = diff_partitions(&build(&[upcoming.clone()]), &build(&[upcoming, today_task]));
        assert_eq!(diff.sections_inserted, vec![0]);
        assert!(diff.inserted.is_empty());
    }

    #[test]
    fn removing_last_row_removes_section_with_old_coordinates() {
        let now = due_in("now", 0);
        let later = due_in("later", 4);
        let diff = diff_partitions(&build(&[now.clone(), later]), &build(&[now]));
        assert_eq!(diff.removed, vec![RowPath::new(1, 0)]);
        assert_eq!(diff.sections_removed, vec![1]);
    }

    #[test]
    fn edited_row_is_an_update() {
        let task = due_in("a", 1);
        let mut edited = task.clone();
        edited.description = "with notes".to_string();
        let diff = diff_partitions(&build(&[task]), &build(&[edited]));
        assert_eq!(diff.updated, vec![RowPath::new(0, 0)]);
        assert!(diff.inserted.is_empty() && diff.removed.is_empty());
    }

    #[test]
    fn several_changes_in_one_section_reload_it() {
        let a = due_in("a", 1);
        let b = due_in("b", 2);
        let c = due_in("c", 3);
        let diff = diff_partitions(&build(&[a.clone()]), &build(&[a, b, c]));
        assert_eq!(
            diff,
            RowDiff {
                sections_reloaded: vec![0],
                ..RowDiff::default()
            }
        );
    }

    #[test]
    fn moving_between_sections_removes_and_inserts() {
        let stays = due_in("stays", 0);
        let moving = due_in("moving", 0);
        let mut moved = moving.clone();
        moved.date_to_complete = today().checked_add_days(Days::new(20));
        let also_later = due_in("later", 30);

        let previous = build(&[stays.clone(), moving, also_later.clone()]);
        let current = build(&[also_later, moved, stays]);
        let diff = diff_partitions(&previous, &current);

        assert_eq!(diff.removed, vec![RowPath::new(0, 1)]);
        assert_eq!(diff.inserted, vec![RowPath::new(1, 1)]);
        assert!(diff.sections_reloaded.is_empty());
    }
}
