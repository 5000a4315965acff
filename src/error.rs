//! Error types for captionq.
//!
//! Uses thiserror for derive macros. Expected outcomes such as "task not found"
//! are not errors; they surface as `Ok(false)` / `Ok(None)` from the queue.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for queue and lock operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The user already owns a QUEUED or RUNNING task.
    #[error(
        "user {user_id} already has an active task ({task_id}); finish or cancel the current job first"
    )]
    DuplicateActiveTask { user_id: i64, task_id: String },

    /// Another owner holds the lock for this key.
    #[error("resource locked: {key} is held by {holder}")]
    ResourceLocked { key: String, holder: String },

    /// The lock table reached `max_concurrent_operations`.
    #[error("lock capacity exceeded: {limit} concurrent operations already active")]
    CapacityExceeded { limit: usize },

    /// An admin operation was attempted without an administrator role.
    #[error("user {user_id} is not authorized to {action}")]
    NotAuthorized { user_id: i64, action: String },

    /// A task failed validation before being enqueued.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Configuration could not be loaded or failed validation.
    #[error("config error: {0}")]
    ConfigError(String),

    /// The record store failed. Propagated unmodified, never retried here.
    #[error("record store failure: {0}")]
    StoreError(String),

    /// User provided invalid arguments (CLI level).
    #[error("{0}")]
    UserError(String),
}

impl QueueError {
    /// Whether the caller should treat this as a "try again" condition.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QueueError::DuplicateActiveTask { .. }
                | QueueError::ResourceLocked { .. }
                | QueueError::CapacityExceeded { .. }
        )
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            QueueError::DuplicateActiveTask { .. } => exit_codes::CONFLICT,
            QueueError::ResourceLocked { .. } => exit_codes::LOCK_FAILURE,
            QueueError::CapacityExceeded { .. } => exit_codes::LOCK_FAILURE,
            QueueError::NotAuthorized { .. } => exit_codes::NOT_AUTHORIZED,
            QueueError::InvalidTask(_) => exit_codes::USER_ERROR,
            QueueError::ConfigError(_) => exit_codes::USER_ERROR,
            QueueError::StoreError(_) => exit_codes::STORE_FAILURE,
            QueueError::UserError(_) => exit_codes::USER_ERROR,
        }
    }
}

/// Result type alias for captionq operations.
pub type Result<T> = std::result::Result<T, QueueError>;
