//! Audit trail for administrative actions.
//!
//! Every admin-triggered state change (cancel, requeue, pause/resume, stuck
//! task reclamation, priority override) produces one
//! [`AuditEvent`] naming the acting admin. Events go to an [`AuditSink`]:
//!
//! - [`NdjsonAuditLog`] appends one JSON object per line to a file
//! - [`MemoryAuditLog`] keeps them in memory for inspection
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what was done (`admin_cancel`, `requeue`, ...)
//! - `actor`: acting user id
//! - `task`: optional task id
//! - `details`: freeform object with action-specific details

use crate::error::{QueueError, Result};
use crate::task::UserId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Administrative actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Task cancelled by an administrator
    AdminCancel,
    /// Failed or cancelled task requeued
    Requeue,
    PauseUser,
    ResumeUser,
    /// RUNNING task forced to FAILED after exceeding the stuck threshold
    StuckTaskReclaimed,
    PriorityChange,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::AdminCancel => write!(f, "admin_cancel"),
            AuditAction::Requeue => write!(f, "requeue"),
            AuditAction::PauseUser => write!(f, "pause_user"),
            AuditAction::ResumeUser => write!(f, "resume_user"),
            AuditAction::StuckTaskReclaimed => write!(f, "stuck_task_reclaimed"),
            AuditAction::PriorityChange => write!(f, "priority_change"),
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,

    pub action: AuditAction,

    /// User id of the acting admin (or owner, for owner-initiated actions).
    pub actor: UserId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    pub details: Value,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor: UserId) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor,
            task: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task = Some(task_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            QueueError::StoreError(format!("failed to serialize audit event to JSON: {}", e))
        })
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Append-only NDJSON audit file.
#[derive(Debug, Clone)]
pub struct NdjsonAuditLog {
    path: PathBuf,
}

impl NdjsonAuditLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every event back, oldest first.
    pub fn read_all(&self) -> Result<Vec<AuditEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            QueueError::StoreError(format!(
                "failed to read audit log '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    QueueError::StoreError(format!("malformed audit log line: {}", e))
                })
            })
            .collect()
    }
}

impl AuditSink for NdjsonAuditLog {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        let json_line = event.to_ndjson_line()?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                QueueError::StoreError(format!(
                    "failed to create audit log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                QueueError::StoreError(format!(
                    "failed to open audit log '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            QueueError::StoreError(format!(
                "failed to write audit event to '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            QueueError::StoreError(format!(
                "failed to sync audit log '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

/// In-memory audit sink.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.events.lock().iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
