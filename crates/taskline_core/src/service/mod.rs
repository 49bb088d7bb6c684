//! Core use-case services.
//!
//! # Responsibility
//! - Derive the sectioned, live task list from store queries.
//! - Describe partition changes for list widgets.
//! - Project records into display-ready text.

pub mod partition;
pub mod partition_diff;
pub mod partition_engine;
pub mod task_presenter;
