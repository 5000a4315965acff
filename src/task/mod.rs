//! Task model for captionq.
//!
//! A [`Task`] is one caption generation job owned by exactly one user. The
//! status field follows a small state machine:
//!
//! ```text
//! QUEUED -> RUNNING -> COMPLETED | FAILED
//! QUEUED -> CANCELLED
//! RUNNING -> CANCELLED   (cooperative: the worker observes it)
//! ```
//!
//! Terminal tasks are never resurrected. A requeue builds a fresh task from
//! the terminal one (see [`Task::requeued_copy`]).

use crate::error::{QueueError, Result};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

mod mutations;
#[cfg(test)]
mod tests;

pub use mutations::AdminCancellation;

/// Identifier of the user owning a task.
pub type UserId = i64;

/// Identifier of the platform connection a task targets.
pub type PlatformConnectionId = i64;

/// Pattern for caller-supplied task ids.
static TASK_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{8,64}$").expect("Invalid task ID regex"));

/// Opaque task identifier.
///
/// Generated ids come from a v4 UUID (OS randomness), rendered as 32 hex
/// characters, so they are neither sequential nor guessable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validate a caller-supplied id.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if !TASK_ID_REGEX.is_match(trimmed) {
            return Err(QueueError::InvalidTask(format!(
                "task id '{}' must be 8-64 characters of [A-Za-z0-9_-]",
                raw
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Queued,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// QUEUED or RUNNING. At most one such task may exist per user.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Queued, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a status from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority.
///
/// Variants are declared most urgent first, so the derived `Ord` sorts
/// `Urgent < High < Normal < Low` and an ascending sort yields dequeue order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 4] = [
        TaskPriority::Urgent,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Urgent => "urgent",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        }
    }

    /// Parse a priority from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "urgent" => Some(Self::Urgent),
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caption generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    // =========================================================================
    // Identity and ownership
    // =========================================================================
    pub id: TaskId,

    pub user_id: UserId,

    /// Target context for the job.
    pub platform_connection_id: PlatformConnectionId,

    // =========================================================================
    // Scheduling
    // =========================================================================
    pub status: TaskStatus,

    #[serde(default)]
    pub priority: TaskPriority,

    // =========================================================================
    // Lifecycle timestamps (UTC)
    // =========================================================================
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    // =========================================================================
    // Failure details (FAILED only)
    // =========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,

    // =========================================================================
    // Retries
    // =========================================================================
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub max_retries: u32,

    /// Job parameters. Serialized by the job execution layer, never parsed here.
    #[serde(default)]
    pub settings: String,

    // =========================================================================
    // Admin annotations
    // =========================================================================
    #[serde(default)]
    pub cancelled_by_admin: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<UserId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,

    // =========================================================================
    // Progress (written by the worker)
    // =========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
}

/// Default `max_retries` for tasks built with [`Task::new`].
pub const DEFAULT_MAX_RETRIES: u32 = 3;

impl Task {
    /// Create a QUEUED task with a fresh id and NORMAL priority.
    pub fn new(user_id: UserId, platform_connection_id: PlatformConnectionId) -> Self {
        Self {
            id: TaskId::generate(),
            user_id,
            platform_connection_id,
            status: TaskStatus::Queued,
            priority: TaskPriority::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            error_details: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            settings: String::new(),
            cancelled_by_admin: false,
            admin_user_id: None,
            cancellation_reason: None,
            admin_notes: None,
            progress_percentage: None,
            current_step: None,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_settings(mut self, settings: impl Into<String>) -> Self {
        self.settings = settings.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Time spent waiting in the queue.
    ///
    /// Started tasks report `started_at - created_at`; tasks still QUEUED
    /// report time waited so far. Tasks cancelled before starting report `None`.
    pub fn queue_wait(&self, now: DateTime<Utc>) -> Option<Duration> {
        match (self.started_at, self.status) {
            (Some(started), _) => Some(started - self.created_at),
            (None, TaskStatus::Queued) => Some(now - self.created_at),
            (None, _) => None,
        }
    }

    /// How long the task has been RUNNING.
    pub fn running_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.status != TaskStatus::Running {
            return None;
        }
        self.started_at.map(|started| now - started)
    }
}
