//! Sectioned view over one query's result set.
//!
//! # Invariants
//! - Sections appear in `Section::ALL` order.
//! - No section is empty.
//! - Rows keep the store's sort order.

use crate::model::section::{classify, Section};
use crate::model::task::{TaskId, TaskRecord};
use chrono::NaiveDate;
use serde::Serialize;

/// Row address inside a partition, as `(section index, row index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RowPath {
    pub section: usize,
    pub row: usize,
}

impl RowPath {
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

/// One non-empty bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSection {
    pub section: Section,
    pub tasks: Vec<TaskRecord>,
}

/// Tasks grouped into non-empty sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    sections: Vec<PartitionSection>,
}

impl Partition {
    /// Buckets sorted tasks relative to `today`.
    pub fn build(tasks: impl IntoIterator<Item = TaskRecord>, today: NaiveDate) -> Self {
        let mut buckets: [Vec<TaskRecord>; 4] = Default::default();
        for task in tasks {
            let section = classify(task.date_to_complete, today);
            buckets[section as usize].push(task);
        }

        let sections = Section::ALL
            .into_iter()
            .zip(buckets)
            .filter(|(_, tasks)| !tasks.is_empty())
            .map(|(section, tasks)| PartitionSection { section, tasks })
            .collect();
        Self { sections }
    }

    pub fn sections(&self) -> &[PartitionSection] {
        &self.sections
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total rows across sections.
    pub fn len(&self) -> usize {
        self.sections.iter().map(|section| section.tasks.len()).sum()
    }

    /// Section at a display index.
    pub fn section_at(&self, index: usize) -> Option<Section> {
        self.sections.get(index).map(|entry| entry.section)
    }

    /// Display index of a section, `None` when it is empty.
    pub fn index_of(&self, section: Section) -> Option<usize> {
        self.sections.iter().position(|entry| entry.section == section)
    }

    /// Tasks in one section, empty when the section is absent.
    pub fn tasks_in(&self, section: Section) -> &[TaskRecord] {
        match self.index_of(section) {
            Some(index) => &self.sections[index].tasks,
            None => &[],
        }
    }

    pub fn row_count(&self, index: usize) -> usize {
        self.sections.get(index).map_or(0, |entry| entry.tasks.len())
    }

    pub fn get(&self, path: RowPath) -> Option<&TaskRecord> {
        self.sections.get(path.section)?.tasks.get(path.row)
    }

    /// Locates a task by id.
    pub fn find(&self, id: TaskId) -> Option<RowPath> {
        self.sections
            .iter()
            .enumerate()
            .find_map(|(section_index, entry)| {
                entry
                    .tasks
                    .iter()
                    .position(|task| task.id == id)
                    .map(|row| RowPath::new(section_index, row))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Partition, RowPath};
    use crate::model::section::Section;
    use crate::model::task::TaskRecord;
    use chrono::{Days, NaiveDate};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn due_in(name: &str, days: i64) -> TaskRecord {
        let day = if days >= 0 {
            today().checked_add_days(Days::new(days as u64))
        } else {
            today().checked_sub_days(Days::new(days.unsigned_abs()))
        };
        TaskRecord::new(name, "", day)
    }

    #[test]
    fn build_skips_empty_sections_and_keeps_order() {
        let partition = Partition::build(
            vec![due_in("far", 10), due_in("soon", 2), due_in("soonest", 1)],
            today(),
        );

        assert_eq!(partition.section_count(), 2);
        assert_eq!(partition.section_at(0), Some(Section::NextSevenDays));
        assert_eq!(partition.section_at(1), Some(Section::Upcoming));
        let names: Vec<&str> = partition
            .tasks_in(Section::NextSevenDays)
            .iter()
            .map(|task| task.name.as_str())
            .collect();
        assert_eq!(names, ["soon", "soonest"]);
        assert!(partition.sections().iter().all(|entry| !entry.tasks.is_empty()));
    }

    #[test]
    fn find_and_get_agree() {
        let late = due_in("late", -3);
        let partition = Partition::build(vec![due_in("now", 0), late.clone()], today());

        let path = partition.find(late.id).unwrap();
        assert_eq!(path, RowPath::new(0, 0));
        assert_eq!(partition.get(path), Some(&late));
        assert_eq!(partition.len(), 2);
        assert_eq!(partition.row_count(5), 0);
        assert!(partition.tasks_in(Section::Upcoming).is_empty());
    }
}
