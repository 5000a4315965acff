//! Configuration constants and default value functions.

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "captionq.yaml";

// Default value functions for serde
pub(crate) fn default_max_concurrent_tasks() -> usize {
    3
}
pub(crate) fn default_lock_timeout_secs() -> u64 {
    300
}
pub(crate) fn default_lock_sweep_interval_secs() -> u64 {
    60
}
pub(crate) fn default_max_concurrent_operations() -> usize {
    100
}
pub(crate) fn default_lock_history_capacity() -> usize {
    1000
}
pub(crate) fn default_max_retries() -> u32 {
    crate::task::DEFAULT_MAX_RETRIES
}
pub(crate) fn default_stuck_task_threshold_minutes() -> u32 {
    60
}
pub(crate) fn default_completed_retention_hours() -> u32 {
    24
}
pub(crate) fn default_store_lock_stale_secs() -> u64 {
    60
}
pub(crate) fn default_store_path() -> String {
    "captionq-store.json".to_string()
}
