use crate::audit::{AuditSink, MemoryAuditLog};
use crate::auth::StaticRoles;
use crate::config::QueueConfig;
use crate::locks::LockCoordinator;
use crate::queue::TaskQueueManager;
use crate::store::{MemoryStore, TaskStore};
use crate::task::{Task, TaskPriority, UserId};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// User id holding the administrator role in test queues.
pub(crate) const ADMIN: UserId = 1000;

pub(crate) struct TestQueue {
    pub manager: TaskQueueManager,
    pub store: Arc<MemoryStore>,
    pub locks: Arc<LockCoordinator>,
    pub audit: Arc<MemoryAuditLog>,
}

pub(crate) fn test_queue() -> TestQueue {
    test_queue_with(QueueConfig::default())
}

pub(crate) fn test_queue_with(config: QueueConfig) -> TestQueue {
    let store = Arc::new(MemoryStore::new());
    test_queue_over(store, config)
}

/// Queue over a caller-provided memory store, with [`ADMIN`] as the only admin.
pub(crate) fn test_queue_over(store: Arc<MemoryStore>, config: QueueConfig) -> TestQueue {
    let locks = Arc::new(LockCoordinator::from_config(&config));
    let audit = Arc::new(MemoryAuditLog::new());
    let roles = Arc::new(StaticRoles::new([ADMIN]));
    let dyn_store: Arc<dyn TaskStore> = store.clone();
    let sink: Arc<dyn AuditSink> = audit.clone();
    let manager =
        TaskQueueManager::new(dyn_store, roles, Arc::clone(&locks), config).with_audit_sink(sink);

    TestQueue {
        manager,
        store,
        locks,
        audit,
    }
}

pub(crate) fn config_with_capacity(max_concurrent_tasks: usize) -> QueueConfig {
    QueueConfig {
        max_concurrent_tasks,
        ..Default::default()
    }
}

/// A fresh task for `user_id` created `minutes_ago` minutes in the past.
pub(crate) fn task_created_minutes_ago(
    user_id: UserId,
    priority: TaskPriority,
    minutes_ago: i64,
) -> Task {
    let mut task = Task::new(user_id, 1).with_priority(priority);
    task.created_at = Utc::now() - Duration::minutes(minutes_ago);
    task
}
