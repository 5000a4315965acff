//! Tests for the task model and its state transitions.

use super::*;
use chrono::Duration;

#[test]
fn test_new_task_defaults() {
    let task = Task::new(1, 10);

    assert_eq!(task.user_id, 1);
    assert_eq!(task.platform_connection_id, 10);
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.priority, TaskPriority::Normal);
    assert_eq!(task.retry_count, 0);
    assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
    assert!(task.started_at.is_none());
    assert!(task.is_active());
}

#[test]
fn test_generated_ids_are_unique_and_opaque() {
    let a = TaskId::generate();
    let b = TaskId::generate();

    assert_ne!(a, b);
    assert_eq!(a.as_str().len(), 32);
    assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    // Generated ids pass the caller-supplied id validation too
    assert!(TaskId::parse(a.as_str()).is_ok());
}

#[test]
fn test_task_id_parse_rejects_bad_input() {
    assert!(TaskId::parse("short").is_err());
    assert!(TaskId::parse("has spaces in it").is_err());
    assert!(TaskId::parse("../../etc/passwd").is_err());
    assert!(TaskId::parse(&"x".repeat(65)).is_err());
    assert_eq!(
        TaskId::parse("  caption-job_0001 ").unwrap().as_str(),
        "caption-job_0001"
    );
}

#[test]
fn test_priority_order_is_dequeue_order() {
    let mut priorities = vec![
        TaskPriority::Low,
        TaskPriority::Urgent,
        TaskPriority::Normal,
        TaskPriority::High,
    ];
    priorities.sort();
    assert_eq!(priorities, TaskPriority::ALL.to_vec());
}

#[test]
fn test_priority_and_status_parsing() {
    assert_eq!(TaskPriority::from_str("URGENT"), Some(TaskPriority::Urgent));
    assert_eq!(TaskPriority::from_str("low"), Some(TaskPriority::Low));
    assert_eq!(TaskPriority::from_str("critical"), None);

    assert_eq!(TaskStatus::from_str("Running"), Some(TaskStatus::Running));
    assert_eq!(TaskStatus::from_str("canceled"), Some(TaskStatus::Cancelled));
    assert_eq!(TaskStatus::from_str("paused"), None);
}

#[test]
fn test_state_machine_transitions() {
    use TaskStatus::*;

    assert!(Queued.can_transition_to(Running));
    assert!(Queued.can_transition_to(Cancelled));
    assert!(Running.can_transition_to(Completed));
    assert!(Running.can_transition_to(Failed));
    assert!(Running.can_transition_to(Cancelled));

    assert!(!Queued.can_transition_to(Completed));
    assert!(!Queued.can_transition_to(Failed));
    for terminal in [Completed, Failed, Cancelled] {
        assert!(terminal.is_terminal());
        for next in TaskStatus::ALL {
            assert!(!terminal.can_transition_to(next));
        }
    }
}

#[test]
fn test_run_then_complete() {
    let mut task = Task::new(1, 1);
    let now = Utc::now();

    assert!(task.mark_running(now));
    assert_eq!(task.started_at, Some(now));
    assert!(!task.mark_running(now), "running twice is refused");

    assert!(task.mark_completed(now));
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.completed_at.is_some());
    assert!(!task.mark_cancelled(now, None));
}

#[test]
fn test_failure_records_error() {
    let mut task = Task::new(1, 1);
    let now = Utc::now();

    assert!(!task.mark_failed(now, "not started", None));
    task.mark_running(now);
    assert!(task.mark_failed(now, "platform timeout", Some("HTTP 504".to_string())));

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("platform timeout"));
    assert_eq!(task.error_details.as_deref(), Some("HTTP 504"));
}

#[test]
fn test_admin_cancellation_annotations() {
    let mut task = Task::new(1, 1);
    let admin = AdminCancellation {
        admin_user_id: 99,
        reason: Some("maintenance".to_string()),
    };

    assert!(task.mark_cancelled(Utc::now(), Some(admin)));
    assert!(task.cancelled_by_admin);
    assert_eq!(task.admin_user_id, Some(99));
    assert_eq!(task.cancellation_reason.as_deref(), Some("maintenance"));
}

#[test]
fn test_owner_cancellation_has_no_admin_annotations() {
    let mut task = Task::new(1, 1);
    assert!(task.mark_cancelled(Utc::now(), None));
    assert!(!task.cancelled_by_admin);
    assert!(task.admin_user_id.is_none());
}

#[test]
fn test_requeued_copy_only_from_failed_or_cancelled() {
    let now = Utc::now();
    let mut task = Task::new(5, 7)
        .with_priority(TaskPriority::High)
        .with_settings(r#"{"max_posts":50}"#);

    assert!(task.requeued_copy(now).is_none(), "queued task cannot be requeued");

    task.mark_running(now);
    task.mark_failed(now, "boom", None);
    task.retry_count = 2;

    let copy = task.requeued_copy(now).unwrap();
    assert_ne!(copy.id, task.id);
    assert_eq!(copy.status, TaskStatus::Queued);
    assert_eq!(copy.retry_count, 3);
    assert_eq!(copy.user_id, 5);
    assert_eq!(copy.platform_connection_id, 7);
    assert_eq!(copy.priority, TaskPriority::High);
    assert_eq!(copy.settings, task.settings);
    assert!(copy.error_message.is_none());
    assert!(copy.started_at.is_none());

    // The original is untouched
    assert_eq!(task.status, TaskStatus::Failed);
}

#[test]
fn test_requeued_copy_saturates_retry_count() {
    let now = Utc::now();
    let mut task = Task::new(5, 7);
    task.mark_running(now);
    task.mark_failed(now, "boom", None);
    task.retry_count = u32::MAX;

    let copy = task.requeued_copy(now).unwrap();
    assert_eq!(copy.retry_count, u32::MAX);
}

#[test]
fn test_queue_wait_and_running_time() {
    let created = Utc::now() - Duration::minutes(10);
    let mut task = Task::new(1, 1);
    task.created_at = created;

    let now = Utc::now();
    assert!(task.queue_wait(now).unwrap() >= Duration::minutes(10));
    assert!(task.running_for(now).is_none());

    let started = created + Duration::minutes(4);
    task.mark_running(started);
    assert_eq!(task.queue_wait(now), Some(Duration::minutes(4)));
    assert!(task.running_for(now).unwrap() >= Duration::minutes(6));

    let mut cancelled = Task::new(1, 1);
    cancelled.mark_cancelled(now, None);
    assert!(cancelled.queue_wait(now).is_none());
}

#[test]
fn test_admin_notes_append() {
    let mut task = Task::new(1, 1);
    task.append_admin_note("first");
    task.append_admin_note("second");
    assert_eq!(task.admin_notes.as_deref(), Some("first\nsecond"));
}

#[test]
fn test_serde_roundtrip_preserves_fields() {
    let mut task = Task::new(3, 4).with_settings("opaque-payload");
    task.mark_running(Utc::now());

    let json = serde_json::to_string(&task).unwrap();
    assert!(json.contains("\"status\":\"running\""));
    assert!(json.contains("\"priority\":\"normal\""));

    let parsed: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, task);
}
