//! Bounded operation history for observability.
//!
//! The history is not authoritative state; it only records what the
//! coordinator did, oldest entries falling off first.

use super::metadata::LockOwner;
use super::types::LockKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What happened to a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockAction {
    Acquired,
    /// Same owner acquired an already held key.
    Reentered,
    Released,
    /// Acquisition refused because another owner holds the key.
    Conflict,
    /// Acquisition refused because the lock table is full.
    CapacityRejected,
    ForceReleased,
    /// Evicted after `expires_at` passed.
    Expired,
}

impl std::fmt::Display for LockAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockAction::Acquired => write!(f, "acquired"),
            LockAction::Reentered => write!(f, "reentered"),
            LockAction::Released => write!(f, "released"),
            LockAction::Conflict => write!(f, "conflict"),
            LockAction::CapacityRejected => write!(f, "capacity_rejected"),
            LockAction::ForceReleased => write!(f, "force_released"),
            LockAction::Expired => write!(f, "expired"),
        }
    }
}

/// One history record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: DateTime<Utc>,
    pub action: LockAction,
    pub key: LockKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<String>,
    /// Who performed the action (requester, releaser, admin, or the sweeper).
    pub actor: String,
    /// Owner whose lock was taken away (force release and expiry).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted_owner: Option<LockOwner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HistoryEntry {
    pub fn new(action: LockAction, key: LockKey, actor: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            key,
            lock_id: None,
            actor: actor.into(),
            interrupted_owner: None,
            detail: None,
        }
    }

    pub fn with_lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = Some(lock_id.into());
        self
    }

    pub fn with_interrupted_owner(mut self, owner: LockOwner) -> Self {
        self.interrupted_owner = Some(owner);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Ring buffer of [`HistoryEntry`] values.
#[derive(Debug)]
pub(super) struct OperationHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl OperationHistory {
    pub(super) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub(super) fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub(super) fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::{LockScope, OperationKind};

    fn entry(n: usize) -> HistoryEntry {
        HistoryEntry::new(
            LockAction::Acquired,
            LockKey::new(LockScope::Task, n.to_string(), OperationKind::TaskCreation),
            "tester",
        )
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = OperationHistory::new(3);
        for n in 0..5 {
            history.push(entry(n));
        }

        let ids: Vec<String> = history
            .snapshot()
            .into_iter()
            .map(|e| e.key.resource_id)
            .collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut history = OperationHistory::new(0);
        history.push(entry(1));
        history.push(entry(2));
        assert_eq!(history.snapshot().len(), 1);
        assert_eq!(history.snapshot()[0].key.resource_id, "2");
    }

    #[test]
    fn test_action_display() {
        assert_eq!(LockAction::ForceReleased.to_string(), "force_released");
        assert_eq!(LockAction::CapacityRejected.to_string(), "capacity_rejected");
    }
}
