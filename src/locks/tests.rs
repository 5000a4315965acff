//! Tests for the lock coordinator.

use super::*;
use crate::error::QueueError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn cancel_request(task_id: &str) -> LockRequest {
    LockRequest::new(OperationKind::TaskCancellation, LockScope::Task, task_id)
}

fn small_coordinator(max: usize) -> LockCoordinator {
    LockCoordinator::new(LockSettings {
        max_concurrent_operations: max,
        ..LockSettings::default()
    })
}

#[test]
fn test_acquire_and_drop_releases() {
    let coordinator = LockCoordinator::default();

    let guard = coordinator.acquire(cancel_request("task-0001")).unwrap();
    assert!(!guard.is_reentrant());
    assert!(coordinator.is_locked(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation
    ));
    assert!(guard.lock().expires_at.is_some(), "default timeout applies");

    drop(guard);

    assert!(!coordinator.is_locked(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation
    ));
    assert!(coordinator.active_locks().is_empty());
}

#[test]
fn test_different_kinds_and_scopes_do_not_conflict() {
    let coordinator = LockCoordinator::default();
    let alice = LockOwner::new("alice");
    let bob = LockOwner::new("bob");

    let _a = coordinator
        .acquire_as(alice, cancel_request("task-0001"))
        .unwrap();
    let _b = coordinator
        .acquire_as(
            bob.clone(),
            LockRequest::new(OperationKind::TaskRequeue, LockScope::Task, "task-0001"),
        )
        .unwrap();
    let _c = coordinator
        .acquire_as(
            bob,
            LockRequest::new(OperationKind::TaskCancellation, LockScope::User, "task-0001"),
        )
        .unwrap();

    assert_eq!(coordinator.active_locks().len(), 3);
}

#[test]
fn test_reentrant_acquire_returns_existing_lock() {
    let coordinator = LockCoordinator::default();

    let outer = coordinator.acquire(cancel_request("task-0001")).unwrap();
    let inner = coordinator.acquire(cancel_request("task-0001")).unwrap();

    assert!(inner.is_reentrant());
    assert_eq!(inner.lock_id(), outer.lock_id());
    assert_eq!(coordinator.active_locks().len(), 1);

    // Dropping the inner guard keeps the lock
    drop(inner);
    assert!(coordinator.is_locked(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation
    ));

    // One release of the owning guard is sufficient cleanup
    assert!(outer.release());
    assert!(coordinator.active_locks().is_empty());
}

#[test]
fn test_conflicting_owner_gets_resource_locked_and_callback_fires_once() {
    let coordinator = LockCoordinator::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen_holder = Arc::new(parking_lot::Mutex::new(None));

    {
        let calls = Arc::clone(&calls);
        let seen_holder = Arc::clone(&seen_holder);
        coordinator.register_conflict_callback(OperationKind::TaskCancellation, move |conflict| {
            calls.fetch_add(1, Ordering::SeqCst);
            *seen_holder.lock() = Some(conflict.existing.owner.clone());
        });
    }
    // Callbacks for other kinds must not fire
    let other_calls = Arc::new(AtomicUsize::new(0));
    {
        let other_calls = Arc::clone(&other_calls);
        coordinator.register_conflict_callback(OperationKind::UserManagement, move |_| {
            other_calls.fetch_add(1, Ordering::SeqCst);
        });
    }

    let _held = coordinator
        .acquire_as(LockOwner::new("worker-a"), cancel_request("task-0001"))
        .unwrap();

    let err = coordinator
        .acquire_as(LockOwner::new("worker-b"), cancel_request("task-0001"))
        .unwrap_err();

    match err {
        QueueError::ResourceLocked { key, holder } => {
            assert_eq!(key, "task:task-0001:task_cancellation");
            assert_eq!(holder, "worker-a");
        }
        other => panic!("expected ResourceLocked, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(other_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        seen_holder.lock().as_ref().map(|o| o.to_string()),
        Some("worker-a".to_string())
    );
}

#[test]
fn test_conflict_across_threads() {
    let coordinator = LockCoordinator::default();
    let _held = coordinator.acquire(cancel_request("task-0001")).unwrap();

    std::thread::scope(|s| {
        let result = s
            .spawn(|| coordinator.acquire(cancel_request("task-0001")).map(|_| ()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(QueueError::ResourceLocked { .. })));
    });
}

#[test]
fn test_panicking_callback_does_not_break_acquire() {
    let coordinator = LockCoordinator::default();
    coordinator.register_conflict_callback(OperationKind::TaskCancellation, |_| {
        panic!("notification channel down");
    });

    let _held = coordinator
        .acquire_as(LockOwner::new("a"), cancel_request("task-0001"))
        .unwrap();
    let result = coordinator.acquire_as(LockOwner::new("b"), cancel_request("task-0001"));
    assert!(matches!(result, Err(QueueError::ResourceLocked { .. })));
}

#[test]
fn test_expired_lock_is_treated_as_absent() {
    let coordinator = LockCoordinator::default();

    let stale = coordinator
        .acquire_as(
            LockOwner::new("crashed-worker"),
            cancel_request("task-0001").timeout(Duration::ZERO),
        )
        .unwrap();
    let stale_id = stale.lock_id().to_string();
    std::mem::forget(stale);

    assert!(!coordinator.is_locked(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation
    ));

    let fresh = coordinator
        .acquire_as(LockOwner::new("new-worker"), cancel_request("task-0001"))
        .unwrap();
    assert_ne!(fresh.lock_id(), stale_id);

    // Releasing the evicted lock is a no-op, and does not touch the new holder
    assert!(!coordinator.release(&stale_id));
    assert!(coordinator.is_locked(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation
    ));

    let history = coordinator.history();
    assert!(history.iter().any(|e| e.action == LockAction::Expired
        && e.interrupted_owner.as_ref().map(|o| o.as_str()) == Some("crashed-worker")));
}

#[test]
fn test_acquire_without_expiry() {
    let coordinator = LockCoordinator::default();
    let guard = coordinator
        .acquire(cancel_request("task-0001").no_expiry())
        .unwrap();
    assert!(guard.lock().expires_at.is_none());
    assert_eq!(coordinator.sweep_expired(), 0);
    assert_eq!(coordinator.active_locks().len(), 1);
}

#[test]
fn test_capacity_exceeded() {
    let coordinator = small_coordinator(2);

    let _a = coordinator.acquire(cancel_request("task-0001")).unwrap();
    let _b = coordinator.acquire(cancel_request("task-0002")).unwrap();
    let err = coordinator.acquire(cancel_request("task-0003")).unwrap_err();

    assert_eq!(err, QueueError::CapacityExceeded { limit: 2 });
    assert!(err.is_recoverable());
    assert!(
        coordinator
            .history()
            .iter()
            .any(|e| e.action == LockAction::CapacityRejected)
    );
}

#[test]
fn test_capacity_frees_expired_locks_first() {
    let coordinator = small_coordinator(1);

    let expired = coordinator
        .acquire(cancel_request("task-0001").timeout(Duration::ZERO))
        .unwrap();
    std::mem::forget(expired);

    let _fresh = coordinator.acquire(cancel_request("task-0002")).unwrap();
    assert_eq!(coordinator.active_locks().len(), 1);
}

#[test]
fn test_release_is_idempotent() {
    let coordinator = LockCoordinator::default();
    let guard = coordinator.acquire(cancel_request("task-0001")).unwrap();
    let lock_id = guard.lock_id().to_string();

    assert!(coordinator.release(&lock_id));
    assert!(!coordinator.release(&lock_id));
    assert!(!coordinator.release("never-existed"));

    // The guard's own drop after an external release is harmless
    drop(guard);
    assert!(coordinator.active_locks().is_empty());
}

#[test]
fn test_force_release_records_interrupted_owner() {
    let coordinator = LockCoordinator::default();
    let held = coordinator
        .acquire_as(LockOwner::new("stuck-request"), cancel_request("task-0001"))
        .unwrap();

    assert!(coordinator.force_release(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation,
        "admin:1",
        "request hung"
    ));
    assert!(!coordinator.force_release(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation,
        "admin:1",
        "again"
    ));

    let entry = coordinator
        .history()
        .into_iter()
        .find(|e| e.action == LockAction::ForceReleased)
        .unwrap();
    assert_eq!(entry.actor, "admin:1");
    assert_eq!(entry.detail.as_deref(), Some("request hung"));
    assert_eq!(
        entry.interrupted_owner.map(|o| o.to_string()),
        Some("stuck-request".to_string())
    );

    // Dropping the interrupted guard must not remove a lock it no longer owns
    let _new = coordinator
        .acquire_as(LockOwner::new("next"), cancel_request("task-0001"))
        .unwrap();
    drop(held);
    assert!(coordinator.is_locked(
        LockScope::Task,
        "task-0001",
        &OperationKind::TaskCancellation
    ));
}

#[test]
fn test_lock_released_when_scope_panics() {
    let coordinator = LockCoordinator::default();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = coordinator.acquire(cancel_request("task-0001")).unwrap();
        panic!("job blew up");
    }));

    assert!(result.is_err());
    assert!(coordinator.active_locks().is_empty());
}

#[test]
fn test_lock_released_on_early_return() {
    fn guarded(coordinator: &LockCoordinator, fail: bool) -> crate::error::Result<()> {
        let _guard = coordinator.acquire(cancel_request("task-0001"))?;
        if fail {
            return Err(QueueError::UserError("bail".to_string()));
        }
        Ok(())
    }

    let coordinator = LockCoordinator::default();
    assert!(guarded(&coordinator, true).is_err());
    assert!(coordinator.active_locks().is_empty());
    assert!(guarded(&coordinator, false).is_ok());
    assert!(coordinator.active_locks().is_empty());
}

#[test]
fn test_metadata_is_kept_on_lock() {
    let coordinator = LockCoordinator::default();
    let guard = coordinator
        .acquire(cancel_request("task-0001").metadata("admin_user_id", "7"))
        .unwrap();
    assert_eq!(
        guard.lock().metadata.get("admin_user_id").map(String::as_str),
        Some("7")
    );
}

#[test]
fn test_sweep_expired_removes_only_expired() {
    let coordinator = LockCoordinator::default();
    let expired = coordinator
        .acquire(cancel_request("task-0001").timeout(Duration::ZERO))
        .unwrap();
    std::mem::forget(expired);
    let _live = coordinator.acquire(cancel_request("task-0002")).unwrap();

    assert_eq!(coordinator.sweep_expired(), 1);
    assert_eq!(coordinator.sweep_expired(), 0);
    assert_eq!(coordinator.active_locks().len(), 1);
}

#[test]
fn test_background_sweeper_evicts_expired_locks() {
    let coordinator = Arc::new(LockCoordinator::new(LockSettings {
        sweep_interval: Duration::from_millis(10),
        ..LockSettings::default()
    }));
    let handle = coordinator.start_sweeper();

    let expired = coordinator
        .acquire(cancel_request("task-0001").timeout(Duration::from_millis(1)))
        .unwrap();
    std::mem::forget(expired);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut swept = false;
    while Instant::now() < deadline {
        if coordinator
            .history()
            .iter()
            .any(|e| e.action == LockAction::Expired)
        {
            swept = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    handle.stop();
    assert!(swept, "sweeper should have evicted the expired lock");
}

#[test]
fn test_sweeper_stops_when_handle_dropped() {
    let coordinator = Arc::new(LockCoordinator::new(LockSettings {
        sweep_interval: Duration::from_secs(3600),
        ..LockSettings::default()
    }));
    let started = Instant::now();
    drop(coordinator.start_sweeper());
    // Dropping joins the thread without waiting for the interval
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[test]
fn test_settings_from_config() {
    let mut config = crate::config::QueueConfig::default();
    config.max_concurrent_operations = 7;
    config.default_lock_timeout_secs = 30;

    let coordinator = LockCoordinator::from_config(&config);
    assert_eq!(coordinator.settings().max_concurrent_operations, 7);
    assert_eq!(
        coordinator.settings().default_timeout,
        Duration::from_secs(30)
    );
}

#[test]
fn test_lock_display_and_key_format() {
    let key = LockKey::new(
        LockScope::Platform,
        "42",
        OperationKind::Custom("token_refresh".to_string()),
    );
    assert_eq!(key.to_string(), "platform:42:token_refresh");

    let coordinator = LockCoordinator::default();
    let guard = coordinator
        .acquire_as(
            LockOwner::new("web-1"),
            LockRequest::new(key.operation.clone(), key.scope, key.resource_id.clone()),
        )
        .unwrap();
    let rendered = guard.lock().to_string();
    assert!(rendered.contains("platform:42:token_refresh"));
    assert!(rendered.contains("web-1"));
    assert_eq!(coordinator.holder(&key).unwrap().owner.as_str(), "web-1");
}

#[test]
fn test_current_owner_differs_per_thread() {
    let here = LockOwner::current();
    let there = std::thread::spawn(LockOwner::current).join().unwrap();
    assert_ne!(here, there);
    assert_eq!(here, LockOwner::current());
}
