//! Domain model for task records and their display sections.
//!
//! # Responsibility
//! - Define the persisted task entity.
//! - Define the derived section buckets and the pure classifier.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Sections are derived data and never persisted.

pub mod section;
pub mod task;
