//! Live, sectioned task list driven by store change messages.
//!
//! # Responsibility
//! - Own the active filter and its single store subscription.
//! - Rebuild the partition on every store change and publish a compact diff.
//! - Route create/toggle/delete commands to the store.
//!
//! # Invariants
//! - At most one store subscription is alive; the previous one is released
//!   before a new filter is observed.
//! - Commands never emit events themselves; the resulting store change does.
//! - Empty diffs are not published.
//! - Methods take `&mut self`, so one owner serializes commands and change
//!   handling.

use crate::clock::{Clock, SystemClock};
use crate::model::task::{TaskId, TaskRecord, TaskValidationError};
use crate::repo::task_repo::{RepoError, TaskQuery, TaskRepository};
use crate::repo::watch::{QueryChange, QuerySubscription};
use crate::service::partition::{Partition, RowPath};
use crate::service::partition_diff::{diff_partitions, RowDiff};
use crate::service::task_presenter::{TaskPresenter, TaskProjection};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, Sender};

/// Engine-level error surfaced to the view binding.
#[derive(Debug)]
pub enum EngineError {
    /// Input rejected before any store write.
    Validation(TaskValidationError),
    /// Task id is gone, usually deleted elsewhere. Callers treat it as a no-op.
    NotFound(TaskId),
    /// Store open/read/write failure.
    Store(RepoError),
    /// A query method needs `set_filter` first.
    NoActiveFilter,
}

impl EngineError {
    /// Whether the error is expected under concurrent edits and safe to ignore.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::NoActiveFilter => write!(f, "no active filter; call set_filter first"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Store(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Active list filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFilter {
    pub completed: bool,
    /// Trimmed, never blank.
    pub search_text: Option<String>,
}

impl TaskFilter {
    pub fn new(completed: bool, search_text: Option<&str>) -> Self {
        let query = Self::base_query(completed).with_search(search_text);
        Self {
            completed,
            search_text: query.name_contains,
        }
    }

    pub fn to_query(&self) -> TaskQuery {
        Self::base_query(self.completed).with_search(self.search_text.as_deref())
    }

    fn base_query(completed: bool) -> TaskQuery {
        if completed {
            TaskQuery::completed()
        } else {
            TaskQuery::open()
        }
    }
}

/// What changed in the published partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PartitionChangeKind {
    /// Discard everything and redraw from `current_partition()`.
    FullReload,
    /// Apply the row-level change set.
    RowDiff(RowDiff),
    /// Store failed; the partition was left untouched. Show "data unavailable".
    StoreFailure(String),
}

/// One message on the view binding stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionChangeEvent {
    /// Monotonic per engine, starting at 1.
    pub sequence: u64,
    pub kind: PartitionChangeKind,
}

/// Receiving end of a view registration.
#[derive(Debug)]
pub struct PartitionListener {
    id: u64,
    receiver: Receiver<PartitionChangeEvent>,
}

impl PartitionListener {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn try_next(&self) -> Option<PartitionChangeEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn drain(&self) -> Vec<PartitionChangeEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Partition engine over a task repository.
pub struct PartitionEngine<R: TaskRepository, C: Clock = SystemClock> {
    repo: R,
    clock: C,
    filter: Option<TaskFilter>,
    subscription: Option<QuerySubscription>,
    partition: Partition,
    listeners: BTreeMap<u64, Sender<PartitionChangeEvent>>,
    next_listener_id: u64,
    sequence: u64,
}

impl<R: TaskRepository> PartitionEngine<R, SystemClock> {
    /// Creates an engine using the wall clock.
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: TaskRepository, C: Clock> PartitionEngine<R, C> {
    /// Creates an engine with an explicit reference clock.
    ///
    /// No query runs until `set_filter`.
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            filter: None,
            subscription: None,
            partition: Partition::default(),
            listeners: BTreeMap::new(),
            next_listener_id: 0,
            sequence: 0,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    // -- view registration -------------------------------------------------

    /// Registers a view; events published from now on are queued for it.
    pub fn subscribe(&mut self) -> PartitionListener {
        let (sender, receiver) = mpsc::channel();
        self.next_listener_id += 1;
        let id = self.next_listener_id;
        self.listeners.insert(id, sender);
        PartitionListener { id, receiver }
    }

    /// Removes a view registration. Returns whether it was registered.
    pub fn unsubscribe(&mut self, listener_id: u64) -> bool {
        self.listeners.remove(&listener_id).is_some()
    }

    // -- filter and change handling ---------------------------------------

    /// Replaces the active query and publishes a `FullReload`.
    ///
    /// # Errors
    /// - `Store` when the new query cannot be observed. The partition is
    ///   cleared and a `StoreFailure` event is published too.
    pub fn set_filter(&mut self, completed: bool, search_text: Option<&str>) -> EngineResult<()> {
        if let Some(previous) = self.subscription.take() {
            previous.cancel();
        }

        let filter = TaskFilter::new(completed, search_text);
        info!(
            "event=filter_set module=engine status=start completed={} has_search={}",
            filter.completed,
            filter.search_text.is_some()
        );
        let query = filter.to_query();
        self.filter = Some(filter);

        match self.repo.observe(query) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                // Consumes the queued `Initial` snapshot.
                self.process_pending();
                Ok(())
            }
            Err(err) => {
                warn!("event=filter_set module=engine status=error error={err}");
                self.partition = Partition::default();
                self.publish(PartitionChangeKind::StoreFailure(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Applies every change message queued on the subscription.
    ///
    /// Consecutive `Update` messages are coalesced into one re-query.
    /// Returns the number of messages consumed.
    pub fn process_pending(&mut self) -> usize {
        let Some(subscription) = self.subscription.as_ref() else {
            return 0;
        };
        let changes = subscription.drain();
        let consumed = changes.len();

        let mut stale = false;
        for change in changes {
            if matches!(change, QueryChange::Update { .. }) {
                stale = true;
                continue;
            }
            if std::mem::take(&mut stale) {
                self.refresh_with_diff();
            }
            self.on_store_change(change);
        }
        if stale {
            self.refresh_with_diff();
        }

        consumed
    }

    /// Handles one store change message.
    pub fn on_store_change(&mut self, change: QueryChange) {
        match change {
            QueryChange::Initial(snapshot) => {
                self.partition = Partition::build(snapshot, self.clock.today());
                info!(
                    "event=partition_reload module=engine status=ok sections={} rows={}",
                    self.partition.section_count(),
                    self.partition.len()
                );
                self.publish(PartitionChangeKind::FullReload);
            }
            QueryChange::Update {
                deletions,
                insertions,
                modifications,
            } => {
                debug!(
                    "event=store_change module=engine deletions={} insertions={} modifications={}",
                    deletions.len(),
                    insertions.len(),
                    modifications.len()
                );
                self.refresh_with_diff();
            }
            QueryChange::Error(cause) => {
                warn!("event=store_change module=engine status=error error={cause}");
                self.publish(PartitionChangeKind::StoreFailure(cause));
            }
        }
    }

    /// Re-runs the active query with the current date and publishes a
    /// `FullReload`. Used after day rollover or to resync a view.
    pub fn reload(&mut self) -> EngineResult<()> {
        let query = self
            .filter
            .as_ref()
            .ok_or(EngineError::NoActiveFilter)?
            .to_query();
        match self.repo.query_tasks(&query) {
            Ok(tasks) => {
                self.on_store_change(QueryChange::Initial(tasks));
                Ok(())
            }
            Err(err) => {
                self.publish(PartitionChangeKind::StoreFailure(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Releases the store subscription and every view registration.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.listeners.clear();
        self.filter = None;
        self.partition = Partition::default();
        info!("event=engine_close module=engine status=ok");
    }

    fn refresh_with_diff(&mut self) {
        let Some(query) = self.filter.as_ref().map(TaskFilter::to_query) else {
            return;
        };
        let tasks = match self.repo.query_tasks(&query) {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!("event=partition_refresh module=engine status=error error={err}");
                self.publish(PartitionChangeKind::StoreFailure(err.to_string()));
                return;
            }
        };

        let next = Partition::build(tasks, self.clock.today());
        let diff = diff_partitions(&self.partition, &next);
        self.partition = next;
        if diff.is_empty() {
            return;
        }
        debug!(
            "event=partition_diff module=engine status=ok inserted={} updated={} removed={} sections_reloaded={}",
            diff.inserted.len(),
            diff.updated.len(),
            diff.removed.len(),
            diff.sections_reloaded.len()
        );
        self.publish(PartitionChangeKind::RowDiff(diff));
    }

    fn publish(&mut self, kind: PartitionChangeKind) {
        self.sequence += 1;
        let event = PartitionChangeEvent {
            sequence: self.sequence,
            kind,
        };
        self.listeners
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    // -- commands ------------------------------------------------------------

    /// Writes a new incomplete task.
    ///
    /// # Errors
    /// - `Validation` for a blank name; nothing is written.
    pub fn create_task(
        &mut self,
        name: &str,
        description: &str,
        date_to_complete: NaiveDate,
    ) -> EngineResult<TaskId> {
        if name.trim().is_empty() {
            warn!("event=task_create module=engine status=rejected error_code=empty_name");
            return Err(EngineError::Validation(TaskValidationError::EmptyName));
        }

        let task = TaskRecord::new(name, description, Some(date_to_complete));
        let id = self.repo.insert_task(&task)?;
        info!("event=task_create module=engine status=ok");
        Ok(id)
    }

    /// Flips completion. Completing stamps the current time; un-completing
    /// clears it.
    pub fn toggle_complete(&mut self, id: TaskId) -> EngineResult<TaskRecord> {
        let now = self.clock.now_utc();
        match self.repo.update_task(id, |task| task.toggle_complete(now)) {
            Ok(task) => {
                info!(
                    "event=task_toggle module=engine status=ok is_complete={}",
                    task.is_complete
                );
                Ok(task)
            }
            Err(err) => Err(log_command_error("task_toggle", err.into())),
        }
    }

    pub fn delete_task(&mut self, id: TaskId) -> EngineResult<()> {
        match self.repo.delete_task(id) {
            Ok(()) => {
                info!("event=task_delete module=engine status=ok");
                Ok(())
            }
            Err(err) => Err(log_command_error("task_delete", err.into())),
        }
    }

    // -- queries -------------------------------------------------------------

    pub fn current_partition(&self) -> &Partition {
        &self.partition
    }

    pub fn filter(&self) -> Option<&TaskFilter> {
        self.filter.as_ref()
    }

    pub fn section_count(&self) -> usize {
        self.partition.section_count()
    }

    pub fn row_count(&self, section: usize) -> usize {
        self.partition.row_count(section)
    }

    pub fn title(&self, section: usize) -> Option<String> {
        let section = self.partition.section_at(section)?;
        Some(TaskPresenter::new(&self.clock).section_title(section))
    }

    pub fn item(&self, section: usize, row: usize) -> Option<TaskProjection> {
        let task = self.partition.get(RowPath::new(section, row))?;
        Some(TaskPresenter::new(&self.clock).project(task))
    }

    /// Detail projection straight from the store, independent of the filter.
    pub fn task(&self, id: TaskId) -> EngineResult<TaskProjection> {
        let task = self.repo.find_task(id)?.ok_or(EngineError::NotFound(id))?;
        Ok(TaskPresenter::new(&self.clock).project(&task))
    }
}

fn log_command_error(event: &str, err: EngineError) -> EngineError {
    if err.is_benign() {
        info!("event={event} module=engine status=noop reason=not_found");
    } else {
        warn!("event={event} module=engine status=error error={err}");
    }
    err
}
