//! Queue statistics.

use crate::task::{Task, TaskPriority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time summary of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub total_tasks: usize,
    pub queued_count: usize,
    pub running_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,

    /// QUEUED tasks per priority; every priority is present.
    pub queued_by_priority: BTreeMap<TaskPriority, usize>,

    /// Mean time between creation and start (or now, for QUEUED tasks).
    pub average_wait_seconds: Option<f64>,
    pub max_wait_seconds: Option<i64>,

    pub total_retries: u64,
    pub tasks_with_retries: usize,

    pub paused_users: usize,
    pub max_concurrent_tasks: usize,
    pub generated_at: DateTime<Utc>,
}

impl QueueStatistics {
    pub fn compute<'a>(
        tasks: impl IntoIterator<Item = &'a Task>,
        paused_users: usize,
        max_concurrent_tasks: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self {
            queued_by_priority: TaskPriority::ALL.iter().map(|p| (*p, 0)).collect(),
            paused_users,
            max_concurrent_tasks,
            generated_at: now,
            ..Default::default()
        };
        let mut wait_total = 0i64;
        let mut wait_samples = 0i64;

        for task in tasks {
            stats.total_tasks += 1;
            match task.status {
                TaskStatus::Queued => {
                    stats.queued_count += 1;
                    *stats.queued_by_priority.entry(task.priority).or_default() += 1;
                }
                TaskStatus::Running => stats.running_count += 1,
                TaskStatus::Completed => stats.completed_count += 1,
                TaskStatus::Failed => stats.failed_count += 1,
                TaskStatus::Cancelled => stats.cancelled_count += 1,
            }

            if task.retry_count > 0 {
                stats.total_retries += u64::from(task.retry_count);
                stats.tasks_with_retries += 1;
            }

            if let Some(wait) = task.queue_wait(now) {
                let secs = wait.num_seconds().max(0);
                wait_total += secs;
                wait_samples += 1;
                stats.max_wait_seconds = Some(stats.max_wait_seconds.map_or(secs, |m| m.max(secs)));
            }
        }

        if wait_samples > 0 {
            stats.average_wait_seconds = Some(wait_total as f64 / wait_samples as f64);
        }
        stats
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Queued => self.queued_count,
            TaskStatus::Running => self.running_count,
            TaskStatus::Completed => self.completed_count,
            TaskStatus::Failed => self.failed_count,
            TaskStatus::Cancelled => self.cancelled_count,
        }
    }

    /// Free RUNNING slots.
    pub fn available_slots(&self) -> usize {
        self.max_concurrent_tasks.saturating_sub(self.running_count)
    }
}
