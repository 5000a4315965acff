//! The in-process lock coordinator.

use super::guard::ScopedLock;
use super::history::{HistoryEntry, LockAction, OperationHistory};
use super::metadata::LockOwner;
use super::types::{
    LockConflict, LockKey, LockRequest, LockScope, LockTimeout, OperationKind, OperationLock,
};
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Callback invoked when an acquisition conflicts with a held lock.
pub type ConflictCallback = Arc<dyn Fn(&LockConflict) + Send + Sync>;

/// Tunables of a [`LockCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    /// Expiry used for [`LockTimeout::Default`].
    pub default_timeout: Duration,
    /// Interval of the background sweep started by `start_sweeper`.
    pub sweep_interval: Duration,
    /// Maximum number of live locks.
    pub max_concurrent_operations: usize,
    /// Size of the operation history ring buffer.
    pub history_capacity: usize,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            max_concurrent_operations: 100,
            history_capacity: 1000,
        }
    }
}

impl From<&QueueConfig> for LockSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            default_timeout: config.default_lock_timeout(),
            sweep_interval: config.lock_sweep_interval(),
            max_concurrent_operations: config.max_concurrent_operations,
            history_capacity: config.lock_history_capacity,
        }
    }
}

#[derive(Debug)]
struct LockTable {
    locks: HashMap<LockKey, OperationLock>,
    keys_by_id: HashMap<String, LockKey>,
    history: OperationHistory,
}

impl LockTable {
    fn remove(&mut self, key: &LockKey) -> Option<OperationLock> {
        let lock = self.locks.remove(key)?;
        self.keys_by_id.remove(&lock.lock_id);
        Some(lock)
    }

    /// Drop the lock under `key` if it has expired.
    fn evict_if_expired(&mut self, key: &LockKey, now: DateTime<Utc>) -> bool {
        let expired = self.locks.get(key).is_some_and(|lock| lock.is_expired(now));
        if expired && let Some(lock) = self.remove(key) {
            self.record_expiry(lock);
        }
        expired
    }

    fn evict_all_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<LockKey> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(lock) = self.remove(key) {
                self.record_expiry(lock);
            }
        }
        expired.len()
    }

    fn record_expiry(&mut self, lock: OperationLock) {
        debug!(key = %lock.key, owner = %lock.owner, "lock expired");
        self.history.push(
            HistoryEntry::new(LockAction::Expired, lock.key, "expiry")
                .with_lock_id(lock.lock_id)
                .with_interrupted_owner(lock.owner),
        );
    }
}

/// Mutual-exclusion manager keyed by (scope, resource, operation kind).
///
/// Acquisition never waits: a held key fails fast with
/// [`QueueError::ResourceLocked`]. The whole table sits behind one mutex, which
/// is fine for the bounded number of live locks.
pub struct LockCoordinator {
    settings: LockSettings,
    table: Mutex<LockTable>,
    callbacks: RwLock<HashMap<OperationKind, Vec<ConflictCallback>>>,
}

impl std::fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("settings", &self.settings)
            .field("active_locks", &self.table.lock().locks.len())
            .finish_non_exhaustive()
    }
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new(LockSettings::default())
    }
}

impl LockCoordinator {
    pub fn new(settings: LockSettings) -> Self {
        let history = OperationHistory::new(settings.history_capacity);
        Self {
            settings,
            table: Mutex::new(LockTable {
                locks: HashMap::new(),
                keys_by_id: HashMap::new(),
                history,
            }),
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(LockSettings::from(config))
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Acquire a lock on behalf of the calling thread.
    pub fn acquire(&self, request: LockRequest) -> Result<ScopedLock<'_>> {
        self.acquire_as(LockOwner::current(), request)
    }

    /// Acquire a lock on behalf of an explicit owner.
    ///
    /// # Returns
    ///
    /// * `Ok(ScopedLock)` - New lock, or a non-owning guard when `owner`
    ///   already holds the key
    /// * `Err(QueueError::ResourceLocked)` - Another owner holds the key;
    ///   conflict callbacks for the operation kind have been invoked
    /// * `Err(QueueError::CapacityExceeded)` - The lock table is full
    pub fn acquire_as(&self, owner: LockOwner, request: LockRequest) -> Result<ScopedLock<'_>> {
        let now = Utc::now();
        let LockRequest {
            key,
            timeout,
            metadata,
        } = request;

        let mut table = self.table.lock();
        table.evict_if_expired(&key, now);

        if let Some(existing) = table.locks.get(&key).cloned() {
            if existing.owner == owner {
                table.history.push(
                    HistoryEntry::new(LockAction::Reentered, key, owner.as_str())
                        .with_lock_id(existing.lock_id.clone()),
                );
                debug!(key = %existing.key, owner = %owner, "lock re-entered");
                return Ok(ScopedLock::reentrant(self, existing));
            }

            table.history.push(
                HistoryEntry::new(LockAction::Conflict, key.clone(), owner.as_str())
                    .with_lock_id(existing.lock_id.clone())
                    .with_detail(format!("held by {}", existing.owner)),
            );
            drop(table);

            debug!(key = %key, holder = %existing.owner, requester = %owner, "lock conflict");
            let holder = existing.owner.to_string();
            let conflict = LockConflict {
                key: key.clone(),
                existing,
                requester: owner,
                requested_at: now,
                requested_metadata: metadata,
            };
            self.notify_conflict(&conflict);

            return Err(QueueError::ResourceLocked {
                key: key.to_string(),
                holder,
            });
        }

        if table.locks.len() >= self.settings.max_concurrent_operations {
            table.evict_all_expired(now);
        }
        if table.locks.len() >= self.settings.max_concurrent_operations {
            table.history.push(
                HistoryEntry::new(LockAction::CapacityRejected, key.clone(), owner.as_str())
                    .with_detail(format!(
                        "{} locks active",
                        self.settings.max_concurrent_operations
                    )),
            );
            warn!(
                key = %key,
                limit = self.settings.max_concurrent_operations,
                "lock capacity exceeded"
            );
            return Err(QueueError::CapacityExceeded {
                limit: self.settings.max_concurrent_operations,
            });
        }

        let lock = OperationLock {
            lock_id: Uuid::new_v4().to_string(),
            key: key.clone(),
            owner: owner.clone(),
            created_at: now,
            expires_at: self.expiry_for(timeout, now),
            metadata,
        };

        table.keys_by_id.insert(lock.lock_id.clone(), key.clone());
        table.locks.insert(key.clone(), lock.clone());
        table.history.push(
            HistoryEntry::new(LockAction::Acquired, key, owner.as_str())
                .with_lock_id(lock.lock_id.clone()),
        );
        debug!(key = %lock.key, owner = %owner, lock_id = %lock.lock_id, metadata = ?lock.metadata, "lock acquired");

        Ok(ScopedLock::owned(self, lock))
    }

    /// Release a lock by id.
    ///
    /// Idempotent: returns `false` when the lock no longer exists (already
    /// released, force-released or expired).
    pub fn release(&self, lock_id: &str) -> bool {
        let mut table = self.table.lock();
        let Some(key) = table.keys_by_id.get(lock_id).cloned() else {
            return false;
        };
        let Some(lock) = table.remove(&key) else {
            return false;
        };

        table.history.push(
            HistoryEntry::new(LockAction::Released, lock.key.clone(), lock.owner.as_str())
                .with_lock_id(lock.lock_id.clone()),
        );
        debug!(key = %lock.key, lock_id = %lock.lock_id, "lock released");
        true
    }

    /// Whether a live lock exists for the key. Expired entries are evicted first.
    pub fn is_locked(&self, scope: LockScope, resource_id: &str, operation: &OperationKind) -> bool {
        let key = LockKey::new(scope, resource_id, operation.clone());
        let mut table = self.table.lock();
        table.evict_if_expired(&key, Utc::now());
        table.locks.contains_key(&key)
    }

    /// Current holder of a key, if any.
    pub fn holder(&self, key: &LockKey) -> Option<OperationLock> {
        let mut table = self.table.lock();
        table.evict_if_expired(key, Utc::now());
        table.locks.get(key).cloned()
    }

    /// Administrative release regardless of owner.
    ///
    /// The interrupted owner, acting admin and reason are recorded in the
    /// history and logged.
    pub fn force_release(
        &self,
        scope: LockScope,
        resource_id: &str,
        operation: &OperationKind,
        actor: &str,
        reason: &str,
    ) -> bool {
        let key = LockKey::new(scope, resource_id, operation.clone());
        let mut table = self.table.lock();
        let Some(lock) = table.remove(&key) else {
            return false;
        };

        info!(
            key = %lock.key,
            interrupted_owner = %lock.owner,
            actor,
            reason,
            "lock force-released"
        );
        table.history.push(
            HistoryEntry::new(LockAction::ForceReleased, lock.key, actor)
                .with_lock_id(lock.lock_id)
                .with_interrupted_owner(lock.owner)
                .with_detail(reason),
        );
        true
    }

    /// Evict every expired lock now. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let evicted = self.table.lock().evict_all_expired(Utc::now());
        if evicted > 0 {
            info!(evicted, "expired locks swept");
        }
        evicted
    }

    /// Register a best-effort notification for conflicts on `operation`.
    pub fn register_conflict_callback<F>(&self, operation: OperationKind, callback: F)
    where
        F: Fn(&LockConflict) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .entry(operation)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Snapshot of live locks, oldest first.
    pub fn active_locks(&self) -> Vec<OperationLock> {
        let now = Utc::now();
        let mut locks: Vec<OperationLock> = self
            .table
            .lock()
            .locks
            .values()
            .filter(|lock| !lock.is_expired(now))
            .cloned()
            .collect();
        locks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        locks
    }

    /// Snapshot of the operation history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.table.lock().history.snapshot()
    }

    fn expiry_for(&self, timeout: LockTimeout, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let duration = match timeout {
            LockTimeout::Never => return None,
            LockTimeout::Default => self.settings.default_timeout,
            LockTimeout::After(duration) => duration,
        };
        // Durations too large to represent behave like "never expires"
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
    }

    fn notify_conflict(&self, conflict: &LockConflict) {
        let callbacks: Vec<ConflictCallback> = self
            .callbacks
            .read()
            .get(&conflict.key.operation)
            .cloned()
            .unwrap_or_default();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(conflict))).is_err() {
                warn!(key = %conflict.key, "lock conflict callback panicked");
            }
        }
    }
}
