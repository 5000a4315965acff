//! Store contents shared by the backends.

use super::{PauseRecord, TaskFilter, UpdateOutcome};
use crate::error::{QueueError, Result};
use crate::task::{Task, TaskId, TaskStatus, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every row the store holds.
///
/// Rows are only changed through methods, so a transaction can journal the
/// previous version of each row it touches and undo them on rollback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    tasks: BTreeMap<TaskId, Task>,
    paused_users: BTreeMap<UserId, PauseRecord>,
    #[serde(skip)]
    undo: Option<Vec<Undo>>,
}

/// Previous version of one touched row. `None` means the row did not exist.
#[derive(Debug, Clone, PartialEq)]
enum Undo {
    Task(TaskId, Option<Task>),
    Pause(UserId, Option<PauseRecord>),
}

impl StoreState {
    pub fn tasks(&self) -> &BTreeMap<TaskId, Task> {
        &self.tasks
    }

    pub fn paused_users(&self) -> &BTreeMap<UserId, PauseRecord> {
        &self.paused_users
    }

    pub fn is_paused(&self, user_id: UserId) -> bool {
        self.paused_users.contains_key(&user_id)
    }

    pub fn insert(&mut self, task: &Task) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(QueueError::StoreError(format!(
                "task '{}' already exists",
                task.id
            )));
        }
        self.record(Undo::Task(task.id.clone(), None));
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).cloned()
    }

    /// Mutable access to one row.
    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        if self.undo.is_some() {
            let previous = self.tasks.get(task_id)?.clone();
            self.record(Undo::Task(previous.id.clone(), Some(previous)));
        }
        self.tasks.get_mut(task_id)
    }

    pub fn update_if(
        &mut self,
        task_id: &str,
        apply: &mut dyn FnMut(&mut Task) -> bool,
    ) -> UpdateOutcome {
        let Some(stored) = self.tasks.get(task_id) else {
            return UpdateOutcome::NotFound;
        };

        // Work on a copy so a declined update cannot leave partial edits behind
        let mut candidate = stored.clone();
        if !apply(&mut candidate) {
            return UpdateOutcome::Unchanged(stored.clone());
        }
        let previous = self.tasks.insert(candidate.id.clone(), candidate.clone());
        self.record(Undo::Task(candidate.id.clone(), previous));
        UpdateOutcome::Updated(candidate)
    }

    pub fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        filter.apply(self.tasks.values())
    }

    pub fn delete(&mut self, task_ids: &[TaskId]) -> usize {
        let mut deleted = 0;
        for id in task_ids {
            if let Some(removed) = self.tasks.remove(id.as_str()) {
                self.record(Undo::Task(removed.id.clone(), Some(removed)));
                deleted += 1;
            }
        }
        deleted
    }

    /// The user's task in QUEUED or RUNNING, if any.
    pub fn active_task_for(&self, user_id: UserId) -> Option<&Task> {
        self.tasks
            .values()
            .find(|task| task.user_id == user_id && task.is_active())
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status == TaskStatus::Running)
            .count()
    }

    pub fn pause_user(&mut self, user_id: UserId, record: PauseRecord) -> bool {
        if self.paused_users.contains_key(&user_id) {
            return false;
        }
        self.record(Undo::Pause(user_id, None));
        self.paused_users.insert(user_id, record);
        true
    }

    pub fn resume_user(&mut self, user_id: UserId) -> Option<PauseRecord> {
        let removed = self.paused_users.remove(&user_id)?;
        self.record(Undo::Pause(user_id, Some(removed.clone())));
        Some(removed)
    }

    /// Start journaling changes.
    ///
    /// A journal left behind by a transaction that never finished (its
    /// operation panicked) is rolled back first.
    pub(super) fn begin(&mut self) {
        self.rollback();
        self.undo = Some(Vec::new());
    }

    /// Keep every change since [`StoreState::begin`].
    pub(super) fn commit(&mut self) {
        self.undo = None;
    }

    /// Undo every change since [`StoreState::begin`].
    pub(super) fn rollback(&mut self) {
        let Some(journal) = self.undo.take() else {
            return;
        };
        for entry in journal.into_iter().rev() {
            match entry {
                Undo::Task(id, Some(task)) => {
                    self.tasks.insert(id, task);
                }
                Undo::Task(id, None) => {
                    self.tasks.remove(&id);
                }
                Undo::Pause(user_id, Some(record)) => {
                    self.paused_users.insert(user_id, record);
                }
                Undo::Pause(user_id, None) => {
                    self.paused_users.remove(&user_id);
                }
            }
        }
    }

    fn record(&mut self, entry: Undo) {
        if let Some(journal) = &mut self.undo {
            journal.push(entry);
        }
    }
}
