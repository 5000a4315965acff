//! Tests for config functionality.

use crate::config::QueueConfig;
use crate::error::QueueError;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = QueueConfig::default();

    assert_eq!(config.max_concurrent_tasks, 3);
    assert_eq!(config.default_max_retries, 3);
    assert_eq!(config.default_lock_timeout_secs, 300);
    assert_eq!(config.lock_sweep_interval_secs, 60);
    assert_eq!(config.max_concurrent_operations, 100);
    assert_eq!(config.lock_history_capacity, 1000);
    assert_eq!(config.stuck_task_threshold_minutes, 60);
    assert_eq!(config.completed_retention_hours, 24);
    assert!(config.admin_users.is_empty());
    assert_eq!(config.store_path, "captionq-store.json");
    assert_eq!(config.store_lock_stale_after(), Duration::from_secs(60));
    assert!(config.audit_log_path.is_none());
    assert_eq!(config.default_lock_timeout(), Duration::from_secs(300));
    assert_eq!(config.lock_sweep_interval(), Duration::from_secs(60));
}

#[test]
fn test_parse_empty_yaml_uses_defaults() {
    let config = QueueConfig::from_yaml("").unwrap();
    assert_eq!(config, QueueConfig::default());
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
max_concurrent_tasks: 5
admin_users: [1, 42]
"#;
    let config = QueueConfig::from_yaml(yaml).unwrap();

    assert_eq!(config.max_concurrent_tasks, 5);
    assert_eq!(config.admin_users, vec![1, 42]);

    // Unspecified values should use defaults
    assert_eq!(config.max_concurrent_operations, 100);
    assert_eq!(config.store_path, "captionq-store.json");
}

#[test]
fn test_parse_full_yaml() {
    let yaml = r#"
max_concurrent_tasks: 2
default_max_retries: 5
stuck_task_threshold_minutes: 30
completed_retention_hours: 48
default_lock_timeout_secs: 120
lock_sweep_interval_secs: 10
max_concurrent_operations: 16
lock_history_capacity: 64
admin_users: [7]
store_path: /var/lib/captionq/store.json
audit_log_path: /var/log/captionq/audit.ndjson
"#;
    let config = QueueConfig::from_yaml(yaml).unwrap();

    assert_eq!(config.max_concurrent_tasks, 2);
    assert_eq!(config.default_max_retries, 5);
    assert_eq!(config.stuck_task_threshold_minutes, 30);
    assert_eq!(config.completed_retention_hours, 48);
    assert_eq!(config.default_lock_timeout_secs, 120);
    assert_eq!(config.lock_sweep_interval_secs, 10);
    assert_eq!(config.max_concurrent_operations, 16);
    assert_eq!(config.lock_history_capacity, 64);
    assert_eq!(config.admin_users, vec![7]);
    assert_eq!(config.store_path, "/var/lib/captionq/store.json");
    assert_eq!(
        config.audit_log_path.as_deref(),
        Some("/var/log/captionq/audit.ndjson")
    );
}

#[test]
fn test_unknown_fields_are_ignored() {
    let yaml = r#"
max_concurrent_tasks: 4
websocket_namespace: /admin
"#;
    let config = QueueConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.max_concurrent_tasks, 4);
}

#[test]
fn test_zero_limits_are_rejected() {
    for field in [
        "max_concurrent_tasks",
        "default_lock_timeout_secs",
        "lock_sweep_interval_secs",
        "max_concurrent_operations",
        "lock_history_capacity",
        "stuck_task_threshold_minutes",
        "completed_retention_hours",
        "store_lock_stale_secs",
    ] {
        let yaml = format!("{}: 0\n", field);
        let err = QueueConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, QueueError::ConfigError(_)));
        assert!(err.to_string().contains(field), "{}", err);
    }
}

#[test]
fn test_empty_store_path_is_rejected() {
    let err = QueueConfig::from_yaml("store_path: \"  \"\n").unwrap_err();
    assert!(err.to_string().contains("store_path"));
}

#[test]
fn test_invalid_yaml_is_a_config_error() {
    let err = QueueConfig::from_yaml("max_concurrent_tasks: [not a number").unwrap_err();
    assert!(matches!(err, QueueError::ConfigError(_)));
}

#[test]
fn test_yaml_roundtrip() {
    let mut config = QueueConfig::default();
    config.admin_users = vec![1, 2];
    config.max_concurrent_tasks = 8;

    let yaml = config.to_yaml().unwrap();
    let parsed = QueueConfig::from_yaml(&yaml).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_load_from_file_and_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("captionq.yaml");

    assert_eq!(
        QueueConfig::load_or_default(&path).unwrap(),
        QueueConfig::default()
    );
    assert!(QueueConfig::load(&path).is_err());

    std::fs::write(&path, "max_concurrent_tasks: 9\n").unwrap();
    assert_eq!(QueueConfig::load(&path).unwrap().max_concurrent_tasks, 9);
    assert_eq!(
        QueueConfig::load_or_default(&path).unwrap().max_concurrent_tasks,
        9
    );
}
