//! Record store collaborator.
//!
//! The queue treats persistence as a transactional record store. A backend must
//! make every trait method atomic with respect to the others; in particular
//! [`TaskStore::update_if`] is a read-modify-write on one row that no other
//! write can interleave with (the in-memory equivalent of
//! `SELECT ... FOR UPDATE`). [`TaskStore::transaction`] extends that to
//! check-then-act sequences spanning several rows.
//!
//! Two backends ship with the crate:
//! - [`MemoryStore`]: a mutex-guarded map, for embedding and tests
//! - [`JsonFileStore`]: a single JSON document guarded by a lock file, so
//!   separate CLI invocations share state

mod file;
mod memory;
mod state;


use crate::error::Result;
use crate::task::{Task, TaskId, TaskStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use file::{DEFAULT_STALE_LOCK, JsonFileStore, StoreLockStatus};
pub use memory::MemoryStore;
pub use state::StoreState;

/// Result of a conditional single-row update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// No task with that id.
    NotFound,
    /// The closure declined to change the task; carries the current row.
    Unchanged(Task),
    /// The closure changed the task; carries the stored row.
    Updated(Task),
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }

    pub fn into_updated(self) -> Option<Task> {
        match self {
            UpdateOutcome::Updated(task) => Some(task),
            _ => None,
        }
    }
}

/// Why and by whom a user's jobs were paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRecord {
    pub admin_user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub paused_at: DateTime<Utc>,
}

/// Row filter for [`TaskStore::list`].
///
/// Results are ordered by `created_at` (oldest first unless `newest_first`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Accepted statuses; empty means any.
    pub statuses: Vec<TaskStatus>,
    pub user_id: Option<UserId>,
    pub limit: Option<usize>,
    pub newest_first: bool,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn active() -> Self {
        Self::all()
            .status(TaskStatus::Queued)
            .status(TaskStatus::Running)
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&task.status))
            && self.user_id.is_none_or(|user_id| task.user_id == user_id)
    }

    /// Filter, order and truncate a set of rows.
    pub fn apply<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) -> Vec<Task> {
        let mut selected: Vec<Task> = tasks
            .into_iter()
            .filter(|task| self.matches(task))
            .cloned()
            .collect();

        selected.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if self.newest_first {
            selected.reverse();
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Transactional CRUD over task rows plus per-user pause flags.
pub trait TaskStore: Send + Sync {
    /// Insert a new row. Fails if the id already exists.
    fn insert(&self, task: &Task) -> Result<()>;

    fn get(&self, task_id: &str) -> Result<Option<Task>>;

    /// Atomically apply `apply` to one row.
    ///
    /// The closure returns whether it changed the task; only then is the row
    /// written back.
    fn update_if(
        &self,
        task_id: &str,
        apply: &mut dyn FnMut(&mut Task) -> bool,
    ) -> Result<UpdateOutcome>;

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Delete rows by id, returning how many existed.
    fn delete(&self, task_ids: &[TaskId]) -> Result<usize>;

    /// Mark a user paused. Returns `false` if already paused (record kept).
    fn pause_user(&self, user_id: UserId, record: PauseRecord) -> Result<bool>;

    /// Clear a user's pause, returning the removed record.
    fn resume_user(&self, user_id: UserId) -> Result<Option<PauseRecord>>;

    fn paused_users(&self) -> Result<BTreeMap<UserId, PauseRecord>>;

    /// Run a multi-row read-modify-write as one transaction.
    ///
    /// `op` returns whether it changed the state. Changes are committed only
    /// when it returns `Ok(true)`; an error or `Ok(false)` leaves the store
    /// untouched and the error is returned as is.
    fn transaction(&self, op: &mut dyn FnMut(&mut StoreState) -> Result<bool>) -> Result<()>;
}
