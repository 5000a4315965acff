//! In-memory record store.

use super::state::StoreState;
use super::{PauseRecord, TaskFilter, TaskStore, UpdateOutcome};
use crate::error::Result;
use crate::task::{Task, TaskId, UserId};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Record store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryStore {
    fn insert(&self, task: &Task) -> Result<()> {
        self.state.lock().insert(task)
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.state.lock().get(task_id))
    }

    fn update_if(
        &self,
        task_id: &str,
        apply: &mut dyn FnMut(&mut Task) -> bool,
    ) -> Result<UpdateOutcome> {
        Ok(self.state.lock().update_if(task_id, apply))
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        Ok(self.state.lock().list(filter))
    }

    fn delete(&self, task_ids: &[TaskId]) -> Result<usize> {
        Ok(self.state.lock().delete(task_ids))
    }

    fn pause_user(&self, user_id: UserId, record: PauseRecord) -> Result<bool> {
        Ok(self.state.lock().pause_user(user_id, record))
    }

    fn resume_user(&self, user_id: UserId) -> Result<Option<PauseRecord>> {
        Ok(self.state.lock().resume_user(user_id))
    }

    fn paused_users(&self) -> Result<BTreeMap<UserId, PauseRecord>> {
        Ok(self.state.lock().paused_users().clone())
    }

    /// Runs `op` on the live rows. Changes are journaled and undone unless
    /// `op` returns `Ok(true)`.
    fn transaction(&self, op: &mut dyn FnMut(&mut StoreState) -> Result<bool>) -> Result<()> {
        let mut state = self.state.lock();
        state.begin();
        match op(&mut state) {
            Ok(true) => {
                state.commit();
                Ok(())
            }
            Ok(false) => {
                state.rollback();
                Ok(())
            }
            Err(e) => {
                state.rollback();
                Err(e)
            }
        }
    }
}
