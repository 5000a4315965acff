//! QueueConfig struct definition and default implementation.

use super::types::*;
use crate::task::UserId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the task queue and lock coordinator.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    // =========================================================================
    // Queue settings
    // =========================================================================
    /// Maximum number of RUNNING tasks before `get_next_task` returns nothing.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// `max_retries` assigned to newly enqueued tasks.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Default threshold for stuck-task reclamation.
    #[serde(default = "default_stuck_task_threshold_minutes")]
    pub stuck_task_threshold_minutes: u32,

    /// Default age after which terminal tasks are purged.
    #[serde(default = "default_completed_retention_hours")]
    pub completed_retention_hours: u32,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Lock expiry applied when `acquire` is given no explicit timeout.
    #[serde(default = "default_lock_timeout_secs")]
    pub default_lock_timeout_secs: u64,

    /// Interval of the background expiry sweep.
    #[serde(default = "default_lock_sweep_interval_secs")]
    pub lock_sweep_interval_secs: u64,

    /// Ceiling on simultaneously held locks.
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,

    /// Size of the lock operation history ring buffer.
    #[serde(default = "default_lock_history_capacity")]
    pub lock_history_capacity: usize,

    // =========================================================================
    // Environment
    // =========================================================================
    /// Users treated as administrators by the static role provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admin_users: Vec<UserId>,

    /// Location of the JSON record store used by the CLI.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Age after which a leftover store lock file is reported as stale and
    /// may be cleared with `captionq unlock-store`.
    #[serde(default = "default_store_lock_stale_secs")]
    pub store_lock_stale_secs: u64,

    /// Optional NDJSON audit log for admin actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            default_max_retries: default_max_retries(),
            stuck_task_threshold_minutes: default_stuck_task_threshold_minutes(),
            completed_retention_hours: default_completed_retention_hours(),
            default_lock_timeout_secs: default_lock_timeout_secs(),
            lock_sweep_interval_secs: default_lock_sweep_interval_secs(),
            max_concurrent_operations: default_max_concurrent_operations(),
            lock_history_capacity: default_lock_history_capacity(),
            admin_users: Vec::new(),
            store_path: default_store_path(),
            store_lock_stale_secs: default_store_lock_stale_secs(),
            audit_log_path: None,
        }
    }
}

impl QueueConfig {
    pub fn default_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.default_lock_timeout_secs)
    }

    pub fn lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lock_sweep_interval_secs)
    }

    pub fn store_lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.store_lock_stale_secs)
    }
}
