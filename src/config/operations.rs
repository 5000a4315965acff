//! Config loading, validation, and serialization.

use super::model::QueueConfig;
use crate::error::{QueueError, Result};
use std::path::Path;

impl QueueConfig {
    /// Load config from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(QueueConfig)` - Successfully loaded and validated config
    /// * `Err(QueueError::ConfigError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            QueueError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from `path` if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: QueueConfig = serde_yaml::from_str(yaml)
            .map_err(|e| QueueError::ConfigError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            QueueError::ConfigError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values.
    ///
    /// Every limit, interval and timeout must be greater than zero.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 8] = [
            ("max_concurrent_tasks", self.max_concurrent_tasks > 0),
            ("default_lock_timeout_secs", self.default_lock_timeout_secs > 0),
            ("lock_sweep_interval_secs", self.lock_sweep_interval_secs > 0),
            ("max_concurrent_operations", self.max_concurrent_operations > 0),
            ("lock_history_capacity", self.lock_history_capacity > 0),
            (
                "stuck_task_threshold_minutes",
                self.stuck_task_threshold_minutes > 0,
            ),
            ("completed_retention_hours", self.completed_retention_hours > 0),
            ("store_lock_stale_secs", self.store_lock_stale_secs > 0),
        ];

        for (field, ok) in checks {
            if !ok {
                return Err(QueueError::ConfigError(format!(
                    "config validation failed: {} must be greater than 0",
                    field
                )));
            }
        }

        if self.store_path.trim().is_empty() {
            return Err(QueueError::ConfigError(
                "config validation failed: store_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
