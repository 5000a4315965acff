//! Command implementations for captionq.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command opens the queue over the JSON record store,
//! runs one operation and prints its result as JSON on stdout.

mod admin;
mod jobs;


use crate::audit::NdjsonAuditLog;
use crate::auth::StaticRoles;
use crate::cli::{Cli, Command};
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::locks::LockCoordinator;
use crate::queue::TaskQueueManager;
use crate::store::JsonFileStore;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs: the loaded config and a queue over the store.
#[derive(Debug)]
pub struct QueueContext {
    pub config: QueueConfig,
    pub store_path: PathBuf,
    pub manager: TaskQueueManager,
}

impl QueueContext {
    /// Load config from `config_path` (defaults when missing) and open the store.
    pub fn open(config_path: &Path, store_override: Option<&Path>) -> Result<Self> {
        let config = QueueConfig::load_or_default(config_path)?;
        let store_path = store_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&config.store_path));
        Ok(Self::with_config(config, store_path))
    }

    pub fn with_config(config: QueueConfig, store_path: PathBuf) -> Self {
        debug!(store = %store_path.display(), "opening record store");

        let store = Arc::new(Self::open_store(&config, &store_path));
        let roles = Arc::new(StaticRoles::from_config(&config));
        let locks = Arc::new(LockCoordinator::from_config(&config));
        let mut manager = TaskQueueManager::new(store, roles, locks, config.clone());
        if let Some(audit_path) = &config.audit_log_path {
            manager = manager.with_audit_sink(Arc::new(NdjsonAuditLog::new(audit_path)));
        }

        Self {
            config,
            store_path,
            manager,
        }
    }

    fn open_store(config: &QueueConfig, store_path: &Path) -> JsonFileStore {
        JsonFileStore::open(store_path).with_stale_lock_after(config.store_lock_stale_after())
    }

    /// The record store on its own, for lock maintenance.
    pub fn file_store(&self) -> JsonFileStore {
        Self::open_store(&self.config, &self.store_path)
    }
}

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. The command's JSON
/// result is printed to stdout.
pub fn dispatch(cli: Cli) -> Result<()> {
    let ctx = QueueContext::open(&cli.config, cli.store.as_deref())?;
    let output = run(&ctx, cli.command)?;
    print_json(&output)
}

/// Run one command against an open queue.
pub fn run(ctx: &QueueContext, command: Command) -> Result<Value> {
    match command {
        Command::Enqueue(args) => jobs::cmd_enqueue(ctx, args),
        Command::Next => jobs::cmd_next(ctx),
        Command::Complete(args) => jobs::cmd_complete(ctx, args),
        Command::Cancel(args) => jobs::cmd_cancel(ctx, args),
        Command::Show(args) => jobs::cmd_show(ctx, args),
        Command::History(args) => jobs::cmd_history(ctx, args),
        Command::Requeue(args) => admin::cmd_requeue(ctx, args),
        Command::List(args) => admin::cmd_list(ctx, args),
        Command::Pause(args) => admin::cmd_pause(ctx, args),
        Command::Resume(args) => admin::cmd_resume(ctx, args),
        Command::ClearStuck(args) => admin::cmd_clear_stuck(ctx, args),
        Command::Priority(args) => admin::cmd_priority(ctx, args),
        Command::Stats(args) => admin::cmd_stats(ctx, args),
        Command::Cleanup(args) => admin::cmd_cleanup(ctx, args),
        Command::UnlockStore(args) => admin::cmd_unlock_store(ctx, args),
    }
}

fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| QueueError::UserError(format!("failed to render output: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

/// Serialize a command result.
fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| QueueError::UserError(format!("failed to render output: {}", e)))
}
