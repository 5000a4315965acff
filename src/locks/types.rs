//! Lock type definitions and information structures.

use super::metadata::LockOwner;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Granularity a lock applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    Global,
    User,
    Platform,
    Task,
    Resource,
}

impl LockScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockScope::Global => "global",
            LockScope::User => "user",
            LockScope::Platform => "platform",
            LockScope::Task => "task",
            LockScope::Resource => "resource",
        }
    }
}

impl std::fmt::Display for LockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of operation a lock serializes.
///
/// Two locks on the same resource but for different kinds do not conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    TaskCreation,
    TaskCancellation,
    TaskRequeue,
    PriorityChange,
    UserManagement,
    PlatformOperation,
    SystemMaintenance,
    /// Caller-defined kind.
    Custom(String),
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::TaskCreation => write!(f, "task_creation"),
            OperationKind::TaskCancellation => write!(f, "task_cancellation"),
            OperationKind::TaskRequeue => write!(f, "task_requeue"),
            OperationKind::PriorityChange => write!(f, "priority_change"),
            OperationKind::UserManagement => write!(f, "user_management"),
            OperationKind::PlatformOperation => write!(f, "platform_operation"),
            OperationKind::SystemMaintenance => write!(f, "system_maintenance"),
            OperationKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Lock identity: at most one live lock exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey {
    pub scope: LockScope,
    pub resource_id: String,
    pub operation: OperationKind,
}

impl LockKey {
    pub fn new(scope: LockScope, resource_id: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            scope,
            resource_id: resource_id.into(),
            operation,
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.resource_id, self.operation)
    }
}

/// How long an acquired lock lives before it is considered expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeout {
    /// Use the coordinator's configured default (300s unless configured).
    #[default]
    Default,
    /// Expire after the given duration.
    After(std::time::Duration),
    /// Held until explicitly released.
    Never,
}

/// Parameters of one `acquire` call.
#[derive(Debug, Clone)]
pub struct LockRequest {
    pub key: LockKey,
    pub timeout: LockTimeout,
    /// Caller annotations, logged but never interpreted.
    pub metadata: BTreeMap<String, String>,
}

impl LockRequest {
    pub fn new(operation: OperationKind, scope: LockScope, resource_id: impl Into<String>) -> Self {
        Self {
            key: LockKey::new(scope, resource_id, operation),
            timeout: LockTimeout::Default,
            metadata: BTreeMap::new(),
        }
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = LockTimeout::After(timeout);
        self
    }

    pub fn no_expiry(mut self) -> Self {
        self.timeout = LockTimeout::Never;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A live lock held by one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLock {
    /// Unique per acquisition.
    pub lock_id: String,

    pub key: LockKey,

    /// Execution context that acquired the lock.
    pub owner: LockOwner,

    pub created_at: DateTime<Utc>,

    /// `None` means held until explicitly released.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl OperationLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Calculate the age of the lock.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl std::fmt::Display for OperationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (owner: {}, age: {}{})",
            self.key,
            self.owner,
            self.age_string(),
            if self.expires_at.is_none() {
                ", no expiry"
            } else {
                ""
            }
        )
    }
}

/// Context handed to conflict callbacks.
#[derive(Debug, Clone)]
pub struct LockConflict {
    pub key: LockKey,
    /// The lock currently holding the key.
    pub existing: OperationLock,
    pub requester: LockOwner,
    pub requested_at: DateTime<Utc>,
    pub requested_metadata: BTreeMap<String, String>,
}
