//! State transitions for tasks.
//!
//! Every helper refuses transitions the state machine does not allow and
//! returns `false` without touching the task in that case.

use super::{Task, TaskId, TaskStatus, UserId};
use chrono::{DateTime, Utc};

/// Who cancelled a task when an administrator did it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCancellation {
    pub admin_user_id: UserId,
    pub reason: Option<String>,
}

impl Task {
    /// QUEUED -> RUNNING, stamping `started_at`.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(TaskStatus::Running) {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        true
    }

    /// RUNNING -> COMPLETED.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(TaskStatus::Completed) {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.error_message = None;
        self.error_details = None;
        true
    }

    /// RUNNING -> FAILED with an error message.
    pub fn mark_failed(
        &mut self,
        now: DateTime<Utc>,
        error_message: impl Into<String>,
        error_details: Option<String>,
    ) -> bool {
        if !self.status.can_transition_to(TaskStatus::Failed) {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.error_message = Some(error_message.into());
        self.error_details = error_details;
        true
    }

    /// QUEUED or RUNNING -> CANCELLED.
    ///
    /// For a RUNNING task this only records intent; the worker has to notice.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>, admin: Option<AdminCancellation>) -> bool {
        if !self.status.can_transition_to(TaskStatus::Cancelled) {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(now);
        if let Some(admin) = admin {
            self.cancelled_by_admin = true;
            self.admin_user_id = Some(admin.admin_user_id);
            self.cancellation_reason = admin.reason;
        }
        true
    }

    /// Append a line to the admin notes.
    pub fn append_admin_note(&mut self, note: &str) {
        match &mut self.admin_notes {
            Some(existing) if !existing.is_empty() => {
                existing.push('\n');
                existing.push_str(note);
            }
            _ => self.admin_notes = Some(note.to_string()),
        }
    }

    /// Build the QUEUED retry of a FAILED or CANCELLED task.
    ///
    /// Returns `None` for non-terminal tasks. The copy keeps owner, platform,
    /// priority, settings and `max_retries`, gets a fresh id and timestamps,
    /// and has `retry_count` incremented by one.
    pub fn requeued_copy(&self, now: DateTime<Utc>) -> Option<Task> {
        if !matches!(self.status, TaskStatus::Failed | TaskStatus::Cancelled) {
            return None;
        }
        let mut copy = Task::new(self.user_id, self.platform_connection_id)
            .with_id(TaskId::generate())
            .with_priority(self.priority)
            .with_settings(self.settings.clone())
            .with_max_retries(self.max_retries);
        copy.created_at = now;
        copy.retry_count = self.retry_count.saturating_add(1);
        Some(copy)
    }
}
