//! Admin control surface.
//!
//! Every operation here except [`TaskQueueManager::get_queue_statistics`]
//! checks the caller's administrator role first and performs no mutation when
//! the check fails. Successful mutations are logged with the acting admin and
//! recorded in the audit trail.

use super::{QueueStatistics, TaskQueueManager, store_failure};
use crate::audit::{AuditAction, AuditEvent};
use crate::error::Result;
use crate::locks::OperationKind;
use crate::store::{PauseRecord, TaskFilter, UpdateOutcome};
use crate::task::{Task, TaskId, TaskPriority, TaskStatus, UserId};
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info};

impl TaskQueueManager {
    /// Stop starting new tasks for `user_id`.
    ///
    /// RUNNING tasks keep running and enqueue is still accepted; the user's
    /// QUEUED task is skipped by `get_next_task` until resumed. Returns
    /// `false` if the user was already paused.
    pub fn pause_user_jobs(
        &self,
        admin_user_id: UserId,
        user_id: UserId,
        reason: Option<String>,
    ) -> Result<bool> {
        self.require_admin(admin_user_id, "pause user jobs")?;
        let _lock = self.user_lock(user_id)?;

        let record = PauseRecord {
            admin_user_id,
            reason: reason.clone(),
            paused_at: Utc::now(),
        };
        let paused = {
            let _critical = self.critical.lock();
            self.store
                .pause_user(user_id, record)
                .map_err(|e| store_failure("pause_user_jobs", e))?
        };
        if !paused {
            debug!(user_id, "pause ignored: user already paused");
            return Ok(false);
        }

        info!(
            user_id,
            admin_user_id,
            reason = reason.as_deref().unwrap_or(""),
            "user jobs paused"
        );
        self.audit(
            AuditEvent::new(AuditAction::PauseUser, admin_user_id)
                .with_details(json!({"user_id": user_id, "reason": reason})),
        );
        Ok(true)
    }

    /// Let `user_id`'s QUEUED task be started again.
    ///
    /// Returns `false` if the user was not paused.
    pub fn resume_user_jobs(&self, admin_user_id: UserId, user_id: UserId) -> Result<bool> {
        self.require_admin(admin_user_id, "resume user jobs")?;
        let _lock = self.user_lock(user_id)?;

        let removed = {
            let _critical = self.critical.lock();
            self.store
                .resume_user(user_id)
                .map_err(|e| store_failure("resume_user_jobs", e))?
        };
        let Some(record) = removed else {
            debug!(user_id, "resume ignored: user not paused");
            return Ok(false);
        };

        info!(user_id, admin_user_id, paused_by = record.admin_user_id, "user jobs resumed");
        self.audit(
            AuditEvent::new(AuditAction::ResumeUser, admin_user_id).with_details(json!({
                "user_id": user_id,
                "paused_by": record.admin_user_id,
                "paused_at": record.paused_at,
            })),
        );
        Ok(true)
    }

    pub fn is_user_paused(&self, user_id: UserId) -> Result<bool> {
        let paused = self
            .store
            .paused_users()
            .map_err(|e| store_failure("is_user_paused", e))?;
        Ok(paused.contains_key(&user_id))
    }

    /// Force RUNNING tasks started more than `threshold_minutes` ago to FAILED.
    ///
    /// Returns the ids of the reclaimed tasks.
    pub fn clear_stuck_tasks(
        &self,
        admin_user_id: UserId,
        threshold_minutes: u32,
    ) -> Result<Vec<TaskId>> {
        self.require_admin(admin_user_id, "clear stuck tasks")?;

        let now = Utc::now();
        let cutoff = now - Duration::minutes(i64::from(threshold_minutes));
        let message = format!(
            "Reclaimed by administrator {}: running for more than {} minutes",
            admin_user_id, threshold_minutes
        );
        let mut reclaimed: Vec<Task> = Vec::new();

        {
            let _critical = self.critical.lock();
            self.store
                .transaction(&mut |state| {
                    reclaimed.clear();
                    let stuck: Vec<TaskId> = state
                        .tasks()
                        .values()
                        .filter(|task| {
                            task.status == TaskStatus::Running
                                && task.started_at.is_some_and(|started| started < cutoff)
                        })
                        .map(|task| task.id.clone())
                        .collect();
                    for task_id in &stuck {
                        let Some(task) = state.task_mut(task_id.as_str()) else {
                            continue;
                        };
                        let details = task
                            .started_at
                            .map(|started| format!("started_at={}", started.to_rfc3339()));
                        if task.mark_failed(now, message.clone(), details) {
                            task.append_admin_note(&message);
                            reclaimed.push(task.clone());
                        }
                    }
                    Ok(!reclaimed.is_empty())
                })
                .map_err(|e| store_failure("clear_stuck_tasks", e))?;
        }

        for task in &reclaimed {
            info!(
                task_id = %task.id,
                user_id = task.user_id,
                admin_user_id,
                threshold_minutes,
                "stuck task reclaimed"
            );
            self.audit(
                AuditEvent::new(AuditAction::StuckTaskReclaimed, admin_user_id)
                    .with_task(task.id.as_str())
                    .with_details(json!({
                        "owner": task.user_id,
                        "started_at": task.started_at,
                        "threshold_minutes": threshold_minutes,
                    })),
            );
        }
        Ok(reclaimed.into_iter().map(|task| task.id).collect())
    }

    /// Change the priority of a QUEUED task.
    ///
    /// Returns `false` if the task is unknown or no longer QUEUED.
    pub fn set_task_priority(
        &self,
        admin_user_id: UserId,
        task_id: &str,
        priority: TaskPriority,
    ) -> Result<bool> {
        self.require_admin(admin_user_id, "change task priority")?;
        let _lock = self.task_lock(OperationKind::PriorityChange, task_id)?;

        let mut previous = None;
        let outcome = self
            .store
            .update_if(task_id, &mut |task| {
                if task.status != TaskStatus::Queued {
                    return false;
                }
                let old = task.priority;
                previous = Some(old);
                task.priority = priority;
                task.append_admin_note(&format!(
                    "priority {} -> {} by admin {}",
                    old, priority, admin_user_id
                ));
                true
            })
            .map_err(|e| store_failure("set_task_priority", e))?;

        let UpdateOutcome::Updated(task) = outcome else {
            debug!(task_id, "priority change ignored: task not found or not queued");
            return Ok(false);
        };

        info!(
            task_id = %task.id,
            admin_user_id,
            from = ?previous,
            to = %priority,
            "task priority changed"
        );
        self.audit(
            AuditEvent::new(AuditAction::PriorityChange, admin_user_id)
                .with_task(task.id.as_str())
                .with_details(json!({"from": previous, "to": priority})),
        );
        Ok(true)
    }

    /// Tasks across all users, newest first.
    pub fn list_tasks(
        &self,
        admin_user_id: UserId,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<Task>> {
        self.require_admin(admin_user_id, "list tasks")?;

        let mut filter = TaskFilter::all().newest_first().limit(limit);
        if let Some(status) = status {
            filter = filter.status(status);
        }
        self.store
            .list(&filter)
            .map_err(|e| store_failure("list_tasks", e))
    }

    /// [`TaskQueueManager::get_queue_statistics`] for callers that must hold
    /// the administrator role.
    pub fn get_admin_queue_statistics(&self, admin_user_id: UserId) -> Result<QueueStatistics> {
        self.require_admin(admin_user_id, "view queue statistics")?;
        self.get_queue_statistics()
    }

    /// Per-status counts, priority breakdown, wait times and retry totals.
    ///
    /// Not role-gated, so end users can see queue depth.
    pub fn get_queue_statistics(&self) -> Result<QueueStatistics> {
        let max_concurrent_tasks = self.config.max_concurrent_tasks;
        let now = Utc::now();
        let mut stats = QueueStatistics::default();

        // A read-only transaction gives one consistent snapshot of tasks and pauses
        self.store
            .transaction(&mut |state| {
                stats = QueueStatistics::compute(
                    state.tasks().values(),
                    state.paused_users().len(),
                    max_concurrent_tasks,
                    now,
                );
                Ok(false)
            })
            .map_err(|e| store_failure("get_queue_statistics", e))?;
        Ok(stats)
    }
}
