//! CLI argument parsing for captionq.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::task::{TaskPriority, TaskStatus, UserId};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// captionq: priority queue for caption generation jobs.
///
/// Keeps at most one active job per user, hands out jobs by priority and
/// gives administrators cancel, requeue, pause and reclamation controls.
/// State lives in a JSON record store shared by every invocation.
#[derive(Parser, Debug)]
#[command(name = "captionq")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long, global = true, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Path to the record store (overrides `store_path` from the config).
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true, action = ArgAction::SetTrue, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for captionq.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a job for a user.
    ///
    /// Fails with exit code 2 if the user already has a queued or running job.
    Enqueue(EnqueueArgs),

    /// Start the next job (worker side).
    ///
    /// Prints the started job, or nothing when the queue is empty or at capacity.
    Next,

    /// Report a running job as finished.
    Complete(CompleteArgs),

    /// Cancel a queued or running job as its owner or as an admin.
    Cancel(CancelArgs),

    /// Create a fresh retry of a failed or cancelled job (admin).
    Requeue(RequeueArgs),

    /// Show one job.
    Show(ShowArgs),

    /// List jobs across all users (admin).
    List(ListArgs),

    /// Show a user's jobs, newest first.
    History(HistoryArgs),

    /// Stop starting jobs for a user (admin).
    Pause(PauseArgs),

    /// Resume starting jobs for a user (admin).
    Resume(ResumeArgs),

    /// Fail running jobs that exceeded the stuck threshold (admin).
    #[command(name = "clear-stuck")]
    ClearStuck(ClearStuckArgs),

    /// Change the priority of a queued job (admin).
    Priority(PriorityArgs),

    /// Print queue statistics.
    Stats(StatsArgs),

    /// Delete finished jobs older than the retention window.
    Cleanup(CleanupArgs),

    /// Remove a stale record store lock left by a crashed process.
    #[command(name = "unlock-store")]
    UnlockStore(UnlockStoreArgs),
}

/// Arguments for the `enqueue` command.
#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    /// Owning user id.
    #[arg(long)]
    pub user: UserId,

    /// Platform connection the job targets.
    #[arg(long)]
    pub platform: i64,

    /// Priority (urgent, high, normal, low).
    #[arg(short, long, value_parser = parse_priority)]
    pub priority: Option<TaskPriority>,

    /// Opaque job settings, passed through to the worker.
    #[arg(long, default_value = "")]
    pub settings: String,

    /// Explicit task id (8-64 characters of [A-Za-z0-9_-]).
    #[arg(long)]
    pub id: Option<String>,

    /// Retry budget (defaults to `default_max_retries` from the config).
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Arguments for the `complete` command.
#[derive(Parser, Debug)]
pub struct CompleteArgs {
    pub task_id: String,

    /// Mark the job FAILED instead of COMPLETED.
    #[arg(long, action = ArgAction::SetTrue)]
    pub failed: bool,

    /// Error message recorded with a failure.
    #[arg(long, requires = "failed")]
    pub error: Option<String>,
}

/// Arguments for the `cancel` command.
#[derive(Parser, Debug)]
pub struct CancelArgs {
    pub task_id: String,

    /// Cancel as the owning user.
    #[arg(long, required_unless_present = "admin")]
    pub user: Option<UserId>,

    /// Cancel as an administrator.
    #[arg(long)]
    pub admin: Option<UserId>,

    /// Reason recorded with an admin cancellation.
    #[arg(long)]
    pub reason: Option<String>,
}

/// Arguments for the `requeue` command.
#[derive(Parser, Debug)]
pub struct RequeueArgs {
    pub task_id: String,

    #[arg(long)]
    pub admin: UserId,
}

/// Arguments for the `show` command.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    pub task_id: String,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub admin: UserId,

    /// Only jobs in this status.
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TaskStatus>,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

/// Arguments for the `history` command.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    pub user: UserId,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

/// Arguments for the `pause` command.
#[derive(Parser, Debug)]
pub struct PauseArgs {
    pub user: UserId,

    #[arg(long)]
    pub admin: UserId,

    #[arg(long)]
    pub reason: Option<String>,
}

/// Arguments for the `resume` command.
#[derive(Parser, Debug)]
pub struct ResumeArgs {
    pub user: UserId,

    #[arg(long)]
    pub admin: UserId,
}

/// Arguments for the `clear-stuck` command.
#[derive(Parser, Debug)]
pub struct ClearStuckArgs {
    #[arg(long)]
    pub admin: UserId,

    /// Running time after which a job counts as stuck (defaults to the config).
    #[arg(long)]
    pub threshold_minutes: Option<u32>,
}

/// Arguments for the `priority` command.
#[derive(Parser, Debug)]
pub struct PriorityArgs {
    pub task_id: String,

    #[arg(value_parser = parse_priority)]
    pub priority: TaskPriority,

    #[arg(long)]
    pub admin: UserId,
}

/// Arguments for the `stats` command.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Require this user to be an administrator.
    #[arg(long)]
    pub admin: Option<UserId>,
}

/// Arguments for the `unlock-store` command.
#[derive(Parser, Debug)]
pub struct UnlockStoreArgs {
    /// Clear the lock even if it is not stale yet.
    #[arg(long, action = ArgAction::SetTrue)]
    pub force: bool,
}

/// Arguments for the `cleanup` command.
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Age of finished jobs to delete (defaults to the config).
    #[arg(long)]
    pub older_than_hours: Option<u32>,
}

fn parse_priority(s: &str) -> Result<TaskPriority, String> {
    TaskPriority::from_str(s)
        .ok_or_else(|| format!("invalid priority '{}' (expected urgent, high, normal or low)", s))
}

fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::from_str(s).ok_or_else(|| {
        format!(
            "invalid status '{}' (expected queued, running, completed, failed or cancelled)",
            s
        )
    })
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
