//! Record store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the task store contract consumed by the partition engine.
//! - Isolate SQLite query details and change subscriptions from services.
//!
//! # Invariants
//! - Repository writes enforce `TaskRecord::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.
//! - Every committed write re-evaluates every live subscription.

pub mod task_repo;
pub mod watch;
