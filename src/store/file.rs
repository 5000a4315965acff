//! JSON file record store.
//!
//! The whole store is one JSON document. Each transaction:
//! 1. Takes an exclusive lock file (`{store}.lock`, created with `create_new`)
//! 2. Reads the document
//! 3. Applies the operation
//! 4. Rewrites the document atomically if anything changed
//! 5. Removes the lock file
//!
//! A held lock file is retried with exponential backoff before the store
//! reports failure. Lock files are never removed automatically: a lock older
//! than the stale threshold is reported as stale (its holder most likely
//! crashed) and must be cleared explicitly with [`JsonFileStore::clear_lock`]
//! (`captionq unlock-store`).

use super::state::StoreState;
use super::{PauseRecord, TaskFilter, TaskStore, UpdateOutcome};
use crate::error::{QueueError, Result};
use crate::fs::atomic_write;
use crate::task::{Task, TaskId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const LOCK_MAX_RETRIES: u32 = 12;
const LOCK_BASE_DELAY_MS: u64 = 5;
const LOCK_MAX_DELAY_MS: u64 = 500;

/// Default age after which a store lock file is reported as stale.
pub const DEFAULT_STALE_LOCK: Duration = Duration::from_secs(60);

/// Contents of the store lock file.
#[derive(Debug, Serialize, Deserialize)]
struct StoreLockInfo {
    pid: u32,
    created_at: DateTime<Utc>,
}

/// The store lock file as found on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreLockStatus {
    pub path: PathBuf,
    /// Holder pid; `None` when the lock file has no readable body.
    pub pid: Option<u32>,
    /// From the lock body, or the file's modification time without one.
    pub created_at: DateTime<Utc>,
    pub age_secs: u64,
    pub stale: bool,
}

impl StoreLockStatus {
    fn holder(&self) -> String {
        match self.pid {
            Some(pid) => format!("pid {}", pid),
            None => "an unknown process".to_string(),
        }
    }
}

/// Removes the store lock file on drop.
struct StoreLockGuard {
    path: PathBuf,
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove store lock");
        }
    }
}

/// Record store persisted as a JSON document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    stale_lock_after: Duration,
    // Threads of this process queue here instead of spinning on the lock file
    local: Mutex<()>,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "captionq-store.json".into());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        Self {
            path,
            lock_path,
            stale_lock_after: DEFAULT_STALE_LOCK,
            local: Mutex::new(()),
        }
    }

    pub fn with_stale_lock_after(mut self, stale_lock_after: Duration) -> Self {
        self.stale_lock_after = stale_lock_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Run `op` inside one store transaction.
    ///
    /// `op` returns its result and whether the state must be written back.
    fn transact<T>(&self, op: impl FnOnce(&mut StoreState) -> Result<(T, bool)>) -> Result<T> {
        let _local = self.local.lock();
        let _file_lock = self.lock_file()?;

        let mut state = self.load()?;
        let (out, dirty) = op(&mut state)?;
        if dirty {
            self.save(&state)?;
        }
        Ok(out)
    }

    fn load(&self) -> Result<StoreState> {
        if !self.path.exists() {
            return Ok(StoreState::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            QueueError::StoreError(format!(
                "failed to read store '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        if content.trim().is_empty() {
            return Ok(StoreState::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            QueueError::StoreError(format!(
                "failed to parse store '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, state: &StoreState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| QueueError::StoreError(format!("failed to serialize store: {}", e)))?;
        atomic_write(&self.path, &json)
    }

    fn lock_file(&self) -> Result<StoreLockGuard> {
        if let Some(parent) = self.lock_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                QueueError::StoreError(format!(
                    "failed to create store directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut attempt = 0u32;
        loop {
            match self.try_lock_file() {
                Ok(guard) => return Ok(guard),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(status) = self.lock_status()?
                        && status.stale
                    {
                        warn!(
                            path = %status.path.display(),
                            pid = ?status.pid,
                            age_secs = status.age_secs,
                            "store lock is stale"
                        );
                        return Err(stale_lock_error(&status));
                    }
                    if attempt >= LOCK_MAX_RETRIES {
                        return Err(QueueError::StoreError(format!(
                            "store is locked by another process: {}",
                            self.lock_path.display()
                        )));
                    }

                    let delay_ms = LOCK_BASE_DELAY_MS
                        .saturating_mul(1u64 << attempt)
                        .min(LOCK_MAX_DELAY_MS);
                    debug!(
                        "store lock busy, retrying in {}ms (attempt {}/{})",
                        delay_ms,
                        attempt + 1,
                        LOCK_MAX_RETRIES
                    );
                    std::thread::sleep(Duration::from_millis(delay_ms));
                    attempt += 1;
                }
                Err(e) => {
                    return Err(QueueError::StoreError(format!(
                        "failed to lock store '{}': {}",
                        self.lock_path.display(),
                        e
                    )));
                }
            }
        }
    }

    fn try_lock_file(&self) -> std::io::Result<StoreLockGuard> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)?;

        let guard = StoreLockGuard {
            path: self.lock_path.clone(),
        };
        let info = StoreLockInfo {
            pid: std::process::id(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&info).map_err(std::io::Error::other)?;
        file.write_all(json.as_bytes())?;
        Ok(guard)
    }

    /// Inspect the store lock file.
    ///
    /// Returns `None` when no lock is held. A lock file without a parsable
    /// body (its holder died between creating and writing it) is aged by its
    /// modification time.
    pub fn lock_status(&self) -> Result<Option<StoreLockStatus>> {
        let content = match fs::read(&self.lock_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.lock_read_error(e)),
        };
        let info = serde_json::from_slice::<StoreLockInfo>(&content).ok();

        let created_at = match &info {
            Some(info) => info.created_at,
            None => match fs::metadata(&self.lock_path).and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(self.lock_read_error(e)),
            },
        };

        let age = Utc::now()
            .signed_duration_since(created_at)
            .to_std()
            .unwrap_or_default();
        Ok(Some(StoreLockStatus {
            path: self.lock_path.clone(),
            pid: info.map(|info| info.pid),
            created_at,
            age_secs: age.as_secs(),
            stale: age > self.stale_lock_after,
        }))
    }

    /// Remove the store lock file.
    ///
    /// Only a stale lock is removed unless `force` is set; removing a live
    /// lock lets two processes write the store at once. Returns the cleared
    /// lock, or `None` if none was held.
    pub fn clear_lock(&self, force: bool) -> Result<Option<StoreLockStatus>> {
        let Some(status) = self.lock_status()? else {
            return Ok(None);
        };
        if !status.stale && !force {
            return Err(QueueError::UserError(format!(
                "store lock '{}' is held by {} for {}s and is not stale.\n\n\
                 Use --force to clear it anyway.",
                status.path.display(),
                status.holder(),
                status.age_secs
            )));
        }

        match fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(QueueError::StoreError(format!(
                    "failed to clear store lock '{}': {}",
                    self.lock_path.display(),
                    e
                )));
            }
        }
        warn!(
            path = %status.path.display(),
            pid = ?status.pid,
            age_secs = status.age_secs,
            forced = force && !status.stale,
            "store lock cleared"
        );
        Ok(Some(status))
    }

    fn lock_read_error(&self, e: std::io::Error) -> QueueError {
        QueueError::StoreError(format!(
            "failed to read store lock '{}': {}",
            self.lock_path.display(),
            e
        ))
    }
}

fn stale_lock_error(status: &StoreLockStatus) -> QueueError {
    QueueError::StoreError(format!(
        "store lock '{}' is stale (held by {} for {}s).\n\n\
         If that process is gone, clear it with `captionq unlock-store`.",
        status.path.display(),
        status.holder(),
        status.age_secs
    ))
}

impl TaskStore for JsonFileStore {
    fn insert(&self, task: &Task) -> Result<()> {
        self.transact(|state| state.insert(task).map(|()| ((), true)))
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>> {
        self.transact(|state| Ok((state.get(task_id), false)))
    }

    fn update_if(
        &self,
        task_id: &str,
        apply: &mut dyn FnMut(&mut Task) -> bool,
    ) -> Result<UpdateOutcome> {
        self.transact(|state| {
            let outcome = state.update_if(task_id, apply);
            let dirty = outcome.is_updated();
            Ok((outcome, dirty))
        })
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.transact(|state| Ok((state.list(filter), false)))
    }

    fn delete(&self, task_ids: &[TaskId]) -> Result<usize> {
        self.transact(|state| {
            let deleted = state.delete(task_ids);
            Ok((deleted, deleted > 0))
        })
    }

    fn pause_user(&self, user_id: UserId, record: PauseRecord) -> Result<bool> {
        self.transact(|state| {
            let paused = state.pause_user(user_id, record);
            Ok((paused, paused))
        })
    }

    fn resume_user(&self, user_id: UserId) -> Result<Option<PauseRecord>> {
        self.transact(|state| {
            let removed = state.resume_user(user_id);
            let dirty = removed.is_some();
            Ok((removed, dirty))
        })
    }

    fn paused_users(&self) -> Result<BTreeMap<UserId, PauseRecord>> {
        self.transact(|state| Ok((state.paused_users().clone(), false)))
    }

    fn transaction(&self, op: &mut dyn FnMut(&mut StoreState) -> Result<bool>) -> Result<()> {
        self.transact(|state| op(state).map(|dirty| ((), dirty)))
    }
}
