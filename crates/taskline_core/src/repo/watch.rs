//! Live-query subscriptions over the task store.
//!
//! # Responsibility
//! - Track every open query subscription and its last delivered snapshot.
//! - Turn store writes into per-subscription change messages.
//!
//! # Invariants
//! - A subscription receives `Initial` exactly once, before any `Update`.
//! - `Update` is only sent when the query's result set actually changed.
//! - Dropping a `QuerySubscription` unregisters it; watchers whose receiver
//!   is gone are pruned on the next notification pass.

use crate::model::task::{TaskId, TaskRecord};
use crate::repo::task_repo::{RepoResult, TaskQuery};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Change message delivered to one live query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryChange {
    /// Full result set at subscription time.
    Initial(Vec<TaskRecord>),
    /// Result set changed since the previous message.
    ///
    /// `deletions` index the previous result set; `insertions` and
    /// `modifications` index the new one.
    Update {
        deletions: Vec<usize>,
        insertions: Vec<usize>,
        modifications: Vec<usize>,
    },
    /// Re-evaluating the query failed.
    Error(String),
}

impl QueryChange {
    /// Index-level change between two result sets, `None` when identical.
    pub fn between(previous: &[TaskRecord], current: &[TaskRecord]) -> Option<Self> {
        let previous_by_id: HashMap<TaskId, &TaskRecord> =
            previous.iter().map(|task| (task.id, task)).collect();
        let current_ids: HashSet<TaskId> = current.iter().map(|task| task.id).collect();

        let deletions: Vec<usize> = previous
            .iter()
            .enumerate()
            .filter(|(_, task)| !current_ids.contains(&task.id))
            .map(|(index, _)| index)
            .collect();

        let mut insertions = Vec::new();
        let mut modifications = Vec::new();
        for (index, task) in current.iter().enumerate() {
            match previous_by_id.get(&task.id) {
                None => insertions.push(index),
                Some(before) if *before != task => modifications.push(index),
                Some(_) => {}
            }
        }

        if deletions.is_empty() && insertions.is_empty() && modifications.is_empty() {
            // Same members and contents; order can still differ.
            let reordered = previous
                .iter()
                .map(|task| task.id)
                .ne(current.iter().map(|task| task.id));
            if !reordered {
                return None;
            }
            modifications = (0..current.len()).collect();
        }

        Some(Self::Update {
            deletions,
            insertions,
            modifications,
        })
    }
}

pub(crate) type SharedWatchRegistry = Arc<Mutex<WatchRegistry>>;

struct Watcher {
    query: TaskQuery,
    snapshot: Vec<TaskRecord>,
    sender: Sender<QueryChange>,
}

/// Open subscriptions keyed by registration id.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    next_id: u64,
    watchers: BTreeMap<u64, Watcher>,
}

impl WatchRegistry {
    pub(crate) fn shared() -> SharedWatchRegistry {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Registers a watcher and queues its `Initial` message.
    pub(crate) fn register(
        registry: &SharedWatchRegistry,
        query: TaskQuery,
        snapshot: Vec<TaskRecord>,
    ) -> QuerySubscription {
        let (sender, receiver) = mpsc::channel();
        // Receiver is still in scope, so this send cannot fail.
        let _ = sender.send(QueryChange::Initial(snapshot.clone()));

        let mut guard = registry.lock().unwrap_or_else(PoisonError::into_inner);
        guard.next_id += 1;
        let id = guard.next_id;
        guard.watchers.insert(
            id,
            Watcher {
                query,
                snapshot,
                sender,
            },
        );
        debug!("event=watch_register module=repo status=ok watch_id={id} active={}", guard.watchers.len());

        QuerySubscription {
            id,
            receiver,
            registry: Arc::downgrade(registry),
        }
    }

    pub(crate) fn unregister(&mut self, id: u64) -> bool {
        let removed = self.watchers.remove(&id).is_some();
        if removed {
            debug!(
                "event=watch_release module=repo status=ok watch_id={id} active={}",
                self.watchers.len()
            );
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Re-evaluates every watcher's query and sends the resulting changes.
    pub(crate) fn notify(
        &mut self,
        mut run_query: impl FnMut(&TaskQuery) -> RepoResult<Vec<TaskRecord>>,
    ) {
        let mut disconnected = Vec::new();

        for (id, watcher) in self.watchers.iter_mut() {
            let message = match run_query(&watcher.query) {
                Ok(current) => match QueryChange::between(&watcher.snapshot, &current) {
                    Some(change) => {
                        watcher.snapshot = current;
                        change
                    }
                    None => continue,
                },
                Err(err) => {
                    warn!("event=watch_notify module=repo status=error watch_id={id} error={err}");
                    QueryChange::Error(err.to_string())
                }
            };

            if watcher.sender.send(message).is_err() {
                disconnected.push(*id);
            }
        }

        for id in disconnected {
            self.watchers.remove(&id);
            debug!("event=watch_prune module=repo status=ok watch_id={id}");
        }
    }
}

/// Handle to one live query.
///
/// Messages queue up until drained; dropping the handle releases the
/// registration.
#[derive(Debug)]
pub struct QuerySubscription {
    id: u64,
    receiver: Receiver<QueryChange>,
    registry: Weak<Mutex<WatchRegistry>>,
}

impl QuerySubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued message, if any.
    pub fn try_next(&self) -> Option<QueryChange> {
        match self.receiver.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Takes every queued message in delivery order.
    pub fn drain(&self) -> Vec<QueryChange> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Releases the registration now instead of at drop.
    pub fn cancel(self) {}
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .unregister(self.id);
        }
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("next_id", &self.next_id)
            .field("active", &self.watchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryChange, WatchRegistry};
    use crate::model::task::TaskRecord;
    use crate::repo::task_repo::{RepoError, TaskQuery};
    use chrono::NaiveDate;

    fn task(name: &str, day: u32) -> TaskRecord {
        TaskRecord::new(name, "", NaiveDate::from_ymd_opt(2026, 10, day))
    }

    #[test]
    fn between_reports_indices_in_old_and_new_sets() {
        let a = task("a", 20);
        let b = task("b", 19);
        let c = task("c", 18);
        let mut b_done = b.clone();
        b_done.description = "edited".to_string();

        let change = QueryChange::between(&[a.clone(), b, c.clone()], &[b_done, c, task("d", 1)]);
        assert_eq!(
            change,
            Some(QueryChange::Update {
                deletions: vec![0],
                insertions: vec![2],
                modifications: vec![0],
            })
        );
    }

    #[test]
    fn between_identical_sets_is_none() {
        let tasks = vec![task("a", 20), task("b", 19)];
        assert_eq!(QueryChange::between(&tasks, &tasks), None);
    }

    #[test]
    fn reorder_without_edits_marks_all_rows_modified() {
        let a = task("a", 20);
        let b = task("b", 19);
        let change = QueryChange::between(&[a.clone(), b.clone()], &[b, a]);
        assert_eq!(
            change,
            Some(QueryChange::Update {
                deletions: vec![],
                insertions: vec![],
                modifications: vec![0, 1],
            })
        );
    }

    #[test]
    fn dropping_subscription_unregisters_watcher() {
        let registry = WatchRegistry::shared();
        let subscription = WatchRegistry::register(&registry, TaskQuery::open(), vec![]);
        assert_eq!(registry.lock().unwrap().len(), 1);
        assert_eq!(subscription.try_next(), Some(QueryChange::Initial(vec![])));

        drop(subscription);
        assert_eq!(registry.lock().unwrap().len(), 0);
    }

    #[test]
    fn notify_forwards_query_errors() {
        let registry = WatchRegistry::shared();
        let subscription = WatchRegistry::register(&registry, TaskQuery::open(), vec![]);
        subscription.drain();

        registry
            .lock()
            .unwrap()
            .notify(|_| Err(RepoError::Unavailable("disk gone".to_string())));

        match subscription.try_next() {
            Some(QueryChange::Error(message)) => assert!(message.contains("disk gone")),
            other => panic!("unexpected change: {other:?}"),
        }
    }
}
