//! Task queue manager.
//!
//! Priority job queue on top of a [`TaskStore`] that keeps at most one active
//! (QUEUED or RUNNING) task per user.
//!
//! # Concurrency
//!
//! `enqueue`, `get_next_task`, `cancel`, `requeue_failed_task` and the
//! pause/stuck-task admin operations run their check-then-act sequence under
//! one process-wide critical section *and* inside a single store transaction,
//! so two callers can never both see "no active task" or both claim the same
//! QUEUED task. `complete` and `set_task_priority` touch one row through
//! [`TaskStore::update_if`] and skip the critical section.
//!
//! Task-scoped admin operations additionally take a lock from the shared
//! [`LockCoordinator`], so conflicting admin actions on the same task fail
//! fast with `ResourceLocked`.
//!
//! # Cancellation
//!
//! Cancelling a RUNNING task only records intent. Workers poll
//! [`TaskQueueManager::cancellation_requested`] or register a
//! [`CancellationListener`].

mod admin;
mod selection;
mod stats;


pub use stats::QueueStatistics;

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::auth::RoleProvider;
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::locks::{LockCoordinator, LockRequest, LockScope, OperationKind, ScopedLock};
use crate::store::{TaskFilter, TaskStore, UpdateOutcome};
use crate::task::{AdminCancellation, Task, TaskId, TaskPriority, TaskStatus, UserId};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Message recorded when a worker reports failure without one.
const DEFAULT_FAILURE_MESSAGE: &str = "task failed";

/// Notified when a RUNNING task is cancelled.
///
/// This is the worker-facing half of cooperative cancellation: the queue
/// flips the status, the listener tells whoever runs the job.
pub trait CancellationListener: Send + Sync {
    fn cancellation_requested(&self, task: &Task);
}

/// Scheduler for caption generation tasks.
pub struct TaskQueueManager {
    store: Arc<dyn TaskStore>,
    roles: Arc<dyn RoleProvider>,
    locks: Arc<LockCoordinator>,
    config: QueueConfig,
    critical: Mutex<()>,
    audit: Option<Arc<dyn AuditSink>>,
    cancellation_listener: Option<Arc<dyn CancellationListener>>,
}

impl std::fmt::Debug for TaskQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueueManager")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl TaskQueueManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        roles: Arc<dyn RoleProvider>,
        locks: Arc<LockCoordinator>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            roles,
            locks,
            config,
            critical: Mutex::new(()),
            audit: None,
            cancellation_listener: None,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_cancellation_listener(mut self, listener: Arc<dyn CancellationListener>) -> Self {
        self.cancellation_listener = Some(listener);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<LockCoordinator> {
        &self.locks
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    // =========================================================================
    // Queue operations
    // =========================================================================

    /// Add a task to the queue.
    ///
    /// # Returns
    ///
    /// * `Ok(TaskId)` - The task is stored as QUEUED
    /// * `Err(QueueError::DuplicateActiveTask)` - The user already has a
    ///   QUEUED or RUNNING task
    /// * `Err(QueueError::InvalidTask)` - The task is not a fresh QUEUED task
    pub fn enqueue(&self, task: Task, priority_override: Option<TaskPriority>) -> Result<TaskId> {
        let mut task = task;
        validate_new_task(&task)?;
        if let Some(priority) = priority_override {
            task.priority = priority;
        }

        let _critical = self.critical.lock();
        self.store
            .transaction(&mut |state| {
                if let Some(active) = state.active_task_for(task.user_id) {
                    return Err(QueueError::DuplicateActiveTask {
                        user_id: task.user_id,
                        task_id: active.id.to_string(),
                    });
                }
                state.insert(&task)?;
                Ok(true)
            })
            .map_err(|e| {
                if let QueueError::DuplicateActiveTask { task_id, .. } = &e {
                    debug!(user_id = task.user_id, active_task = %task_id, "enqueue refused: user has an active task");
                }
                store_failure("enqueue", e)
            })?;

        debug!(task_id = %task.id, user_id = task.user_id, priority = %task.priority, "task enqueued");
        Ok(task.id)
    }

    /// Promote the next QUEUED task to RUNNING and return a copy of it.
    ///
    /// Returns `None` when the RUNNING count has reached
    /// `max_concurrent_tasks` or nothing is selectable. Tasks of paused users
    /// are skipped.
    pub fn get_next_task(&self) -> Result<Option<Task>> {
        let limit = self.config.max_concurrent_tasks;
        let roles = Arc::clone(&self.roles);
        let now = Utc::now();
        let mut claimed = None;

        let _critical = self.critical.lock();
        self.store
            .transaction(&mut |state| {
                if state.running_count() >= limit {
                    return Ok(false);
                }

                let candidates = state.tasks().values().filter(|task| {
                    task.status == TaskStatus::Queued && !state.is_paused(task.user_id)
                });
                let Some(next_id) =
                    selection::select_next(candidates, roles.as_ref()).map(|t| t.id.clone())
                else {
                    return Ok(false);
                };

                let Some(task) = state.task_mut(next_id.as_str()) else {
                    return Ok(false);
                };
                if !task.mark_running(now) {
                    return Ok(false);
                }
                claimed = Some(task.clone());
                Ok(true)
            })
            .map_err(|e| store_failure("get_next_task", e))?;

        match &claimed {
            Some(task) => debug!(task_id = %task.id, user_id = task.user_id, priority = %task.priority, "task started"),
            None => debug!("no task ready to start"),
        }
        Ok(claimed)
    }

    /// Finish a RUNNING task as COMPLETED (`success`) or FAILED.
    ///
    /// Returns `false` when the task is unknown or not RUNNING (for example
    /// because it was cancelled while the worker was busy).
    pub fn complete(
        &self,
        task_id: &str,
        success: bool,
        error_message: Option<String>,
    ) -> Result<bool> {
        let now = Utc::now();
        let outcome = self
            .store
            .update_if(task_id, &mut |task| {
                if success {
                    task.mark_completed(now)
                } else {
                    let message = error_message
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                    task.mark_failed(now, message, None)
                }
            })
            .map_err(|e| store_failure("complete", e))?;

        match outcome {
            UpdateOutcome::Updated(task) => {
                debug!(task_id = %task.id, status = %task.status, "task finished");
                Ok(true)
            }
            UpdateOutcome::Unchanged(task) => {
                debug!(task_id = %task.id, status = %task.status, "complete ignored: task is not running");
                Ok(false)
            }
            UpdateOutcome::NotFound => {
                debug!(task_id, "complete ignored: task not found");
                Ok(false)
            }
        }
    }

    /// Cancel a QUEUED or RUNNING task.
    ///
    /// The caller is authorized as the task's owner (`user_id`) or as an
    /// administrator (`admin_user_id`). An `admin_user_id` without the admin
    /// role is refused with `NotAuthorized`; an owner mismatch, an unknown
    /// task or a terminal task yields `Ok(false)`.
    pub fn cancel(
        &self,
        task_id: &str,
        user_id: Option<UserId>,
        admin_user_id: Option<UserId>,
        reason: Option<String>,
    ) -> Result<bool> {
        if let Some(admin) = admin_user_id {
            self.require_admin(admin, "cancel tasks")?;
        } else if user_id.is_none() {
            warn!(task_id, "cancel refused: no caller identity supplied");
            return Ok(false);
        }

        let _lock = self.task_lock(OperationKind::TaskCancellation, task_id)?;
        let now = Utc::now();
        let mut previous_status = None;
        let mut owner_mismatch = false;

        let outcome = {
            let _critical = self.critical.lock();
            self.store
                .update_if(task_id, &mut |task| {
                    previous_status = Some(task.status);
                    let admin = match admin_user_id {
                        Some(admin_user_id) => Some(AdminCancellation {
                            admin_user_id,
                            reason: reason.clone(),
                        }),
                        None if user_id == Some(task.user_id) => None,
                        None => {
                            owner_mismatch = true;
                            return false;
                        }
                    };
                    task.mark_cancelled(now, admin)
                })
                .map_err(|e| store_failure("cancel", e))?
        };

        let task = match outcome {
            UpdateOutcome::Updated(task) => task,
            UpdateOutcome::Unchanged(task) => {
                if owner_mismatch {
                    warn!(task_id = %task.id, requested_by = ?user_id, "cancel refused: caller does not own the task");
                } else {
                    debug!(task_id = %task.id, status = %task.status, "cancel ignored: task is not active");
                }
                return Ok(false);
            }
            UpdateOutcome::NotFound => {
                debug!(task_id, "cancel ignored: task not found");
                return Ok(false);
            }
        };

        match admin_user_id {
            Some(admin) => {
                info!(
                    task_id = %task.id,
                    admin_user_id = admin,
                    reason = reason.as_deref().unwrap_or(""),
                    "task cancelled by admin"
                );
                self.audit(
                    AuditEvent::new(AuditAction::AdminCancel, admin)
                        .with_task(task.id.as_str())
                        .with_details(json!({
                            "owner": task.user_id,
                            "previous_status": previous_status.map(|s| s.as_str()),
                            "reason": reason,
                        })),
                );
            }
            None => debug!(task_id = %task.id, user_id = task.user_id, "task cancelled by owner"),
        }

        if previous_status == Some(TaskStatus::Running)
            && let Some(listener) = &self.cancellation_listener
        {
            listener.cancellation_requested(&task);
        }
        Ok(true)
    }

    /// Create a fresh QUEUED retry of a FAILED or CANCELLED task.
    ///
    /// Returns `Ok(None)` if the task is unknown or not in a retryable state.
    /// Admin requeues are not bounded by `max_retries`.
    pub fn requeue_failed_task(
        &self,
        task_id: &str,
        admin_user_id: UserId,
    ) -> Result<Option<TaskId>> {
        self.require_admin(admin_user_id, "requeue tasks")?;
        let _lock = self.task_lock(OperationKind::TaskRequeue, task_id)?;

        let now = Utc::now();
        let mut requeued: Option<Task> = None;

        {
            let _critical = self.critical.lock();
            self.store
                .transaction(&mut |state| {
                    let Some(original) = state.get(task_id) else {
                        return Ok(false);
                    };
                    let Some(mut copy) = original.requeued_copy(now) else {
                        return Ok(false);
                    };
                    if let Some(active) = state.active_task_for(original.user_id) {
                        return Err(QueueError::DuplicateActiveTask {
                            user_id: original.user_id,
                            task_id: active.id.to_string(),
                        });
                    }

                    copy.append_admin_note(&format!(
                        "requeued from {} by admin {}",
                        original.id, admin_user_id
                    ));
                    state.insert(&copy)?;
                    requeued = Some(copy);
                    Ok(true)
                })
                .map_err(|e| store_failure("requeue_failed_task", e))?;
        }

        let Some(copy) = requeued else {
            debug!(task_id, "requeue ignored: task not found or not failed/cancelled");
            return Ok(None);
        };

        if copy.retry_count > copy.max_retries {
            info!(
                task_id,
                retry_count = copy.retry_count,
                max_retries = copy.max_retries,
                "requeue exceeds max_retries (admin override)"
            );
        }
        info!(task_id, new_task_id = %copy.id, admin_user_id, retry_count = copy.retry_count, "task requeued");
        self.audit(
            AuditEvent::new(AuditAction::Requeue, admin_user_id)
                .with_task(task_id)
                .with_details(json!({
                    "new_task_id": copy.id.as_str(),
                    "retry_count": copy.retry_count,
                })),
        );
        Ok(Some(copy.id))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.store
            .get(task_id)
            .map_err(|e| store_failure("get_task", e))
    }

    /// The user's QUEUED or RUNNING task, if any.
    pub fn get_user_active_task(&self, user_id: UserId) -> Result<Option<Task>> {
        let filter = TaskFilter::active().user(user_id).limit(1);
        let tasks = self
            .store
            .list(&filter)
            .map_err(|e| store_failure("get_user_active_task", e))?;
        Ok(tasks.into_iter().next())
    }

    /// The user's tasks, newest first.
    pub fn get_user_task_history(&self, user_id: UserId, limit: usize) -> Result<Vec<Task>> {
        let filter = TaskFilter::all().user(user_id).newest_first().limit(limit);
        self.store
            .list(&filter)
            .map_err(|e| store_failure("get_user_task_history", e))
    }

    /// Whether a worker should stop working on `task_id`.
    ///
    /// True once the task has been cancelled; also true for a task that no
    /// longer exists.
    pub fn cancellation_requested(&self, task_id: &str) -> Result<bool> {
        Ok(self
            .get_task(task_id)?
            .is_none_or(|task| task.status == TaskStatus::Cancelled))
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Delete terminal tasks that finished more than `older_than_hours` ago.
    ///
    /// Only COMPLETED, FAILED and CANCELLED rows are touched, so this runs
    /// without the critical section.
    pub fn cleanup_completed_tasks(&self, older_than_hours: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::hours(i64::from(older_than_hours));
        let filter = TaskFilter::all()
            .status(TaskStatus::Completed)
            .status(TaskStatus::Failed)
            .status(TaskStatus::Cancelled);

        let expired: Vec<TaskId> = self
            .store
            .list(&filter)
            .map_err(|e| store_failure("cleanup_completed_tasks", e))?
            .into_iter()
            .filter(|task| task.completed_at.unwrap_or(task.created_at) < cutoff)
            .map(|task| task.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let deleted = self
            .store
            .delete(&expired)
            .map_err(|e| store_failure("cleanup_completed_tasks", e))?;
        info!(deleted, older_than_hours, "purged finished tasks");
        Ok(deleted)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn require_admin(&self, user_id: UserId, action: &str) -> Result<()> {
        if self.roles.is_admin(user_id) {
            return Ok(());
        }
        warn!(user_id, action, "admin operation refused: caller is not an administrator");
        Err(QueueError::NotAuthorized {
            user_id,
            action: action.to_string(),
        })
    }

    fn task_lock(&self, operation: OperationKind, task_id: &str) -> Result<ScopedLock<'_>> {
        self.locks
            .acquire(LockRequest::new(operation, LockScope::Task, task_id))
    }

    fn user_lock(&self, user_id: UserId) -> Result<ScopedLock<'_>> {
        self.locks.acquire(LockRequest::new(
            OperationKind::UserManagement,
            LockScope::User,
            user_id.to_string(),
        ))
    }

    /// Record an audit event. The state change is already committed, so a
    /// failing sink is logged rather than returned.
    fn audit(&self, event: AuditEvent) {
        if let Some(sink) = &self.audit
            && let Err(e) = sink.record(&event)
        {
            warn!(action = %event.action, error = %e, "failed to record audit event");
        }
    }
}

/// Log record store failures before handing them back to the caller.
fn store_failure(operation: &str, err: QueueError) -> QueueError {
    if let QueueError::StoreError(message) = &err {
        error!(operation, error = %message, "record store failure");
    }
    err
}

fn validate_new_task(task: &Task) -> Result<()> {
    if task.status != TaskStatus::Queued {
        return Err(QueueError::InvalidTask(format!(
            "new task '{}' must be queued, not {}",
            task.id, task.status
        )));
    }
    if task.started_at.is_some() || task.completed_at.is_some() {
        return Err(QueueError::InvalidTask(format!(
            "new task '{}' must not carry start or completion timestamps",
            task.id
        )));
    }
    if task.progress_percentage.is_some_and(|p| p > 100) {
        return Err(QueueError::InvalidTask(format!(
            "task '{}' progress must be between 0 and 100",
            task.id
        )));
    }
    Ok(())
}
