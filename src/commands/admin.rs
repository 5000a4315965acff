//! Admin commands: `requeue`, `list`, `pause`, `resume`, `clear-stuck`,
//! `priority`, plus `stats`, `cleanup` and `unlock-store`.

use super::jobs::task_json;
use super::{QueueContext, to_json};
use crate::cli::{
    CleanupArgs, ClearStuckArgs, ListArgs, PauseArgs, PriorityArgs, RequeueArgs, ResumeArgs,
    StatsArgs, UnlockStoreArgs,
};
use crate::error::{QueueError, Result};
use serde_json::{Value, json};

/// Execute the `captionq requeue` command.
pub fn cmd_requeue(ctx: &QueueContext, args: RequeueArgs) -> Result<Value> {
    let new_id = ctx
        .manager
        .requeue_failed_task(&args.task_id, args.admin)?
        .ok_or_else(|| {
            QueueError::UserError(format!(
                "task '{}' cannot be requeued: only failed or cancelled tasks can be retried",
                args.task_id
            ))
        })?;
    task_json(ctx, new_id.as_str())
}

/// Execute the `captionq list` command.
pub fn cmd_list(ctx: &QueueContext, args: ListArgs) -> Result<Value> {
    let tasks = ctx.manager.list_tasks(args.admin, args.status, args.limit)?;
    to_json(&tasks)
}

/// Execute the `captionq pause` command.
pub fn cmd_pause(ctx: &QueueContext, args: PauseArgs) -> Result<Value> {
    let changed = ctx
        .manager
        .pause_user_jobs(args.admin, args.user, args.reason)?;
    Ok(json!({ "user_id": args.user, "paused": true, "changed": changed }))
}

/// Execute the `captionq resume` command.
pub fn cmd_resume(ctx: &QueueContext, args: ResumeArgs) -> Result<Value> {
    let changed = ctx.manager.resume_user_jobs(args.admin, args.user)?;
    Ok(json!({ "user_id": args.user, "paused": false, "changed": changed }))
}

/// Execute the `captionq clear-stuck` command.
pub fn cmd_clear_stuck(ctx: &QueueContext, args: ClearStuckArgs) -> Result<Value> {
    let threshold = args
        .threshold_minutes
        .unwrap_or(ctx.config.stuck_task_threshold_minutes);
    let reclaimed = ctx.manager.clear_stuck_tasks(args.admin, threshold)?;
    Ok(json!({ "threshold_minutes": threshold, "reclaimed": reclaimed }))
}

/// Execute the `captionq priority` command.
pub fn cmd_priority(ctx: &QueueContext, args: PriorityArgs) -> Result<Value> {
    let changed = ctx
        .manager
        .set_task_priority(args.admin, &args.task_id, args.priority)?;
    if !changed {
        return Err(QueueError::UserError(format!(
            "task '{}' is not queued; only queued tasks can be reprioritized",
            args.task_id
        )));
    }
    task_json(ctx, &args.task_id)
}

/// Execute the `captionq stats` command.
///
/// With `--admin` the caller's role is checked first.
pub fn cmd_stats(ctx: &QueueContext, args: StatsArgs) -> Result<Value> {
    let stats = match args.admin {
        Some(admin) => ctx.manager.get_admin_queue_statistics(admin)?,
        None => ctx.manager.get_queue_statistics()?,
    };
    to_json(&stats)
}

/// Execute the `captionq cleanup` command.
pub fn cmd_cleanup(ctx: &QueueContext, args: CleanupArgs) -> Result<Value> {
    let hours = args
        .older_than_hours
        .unwrap_or(ctx.config.completed_retention_hours);
    let deleted = ctx.manager.cleanup_completed_tasks(hours)?;
    Ok(json!({ "older_than_hours": hours, "deleted": deleted }))
}

/// Execute the `captionq unlock-store` command.
///
/// Removes a store lock left behind by a crashed process.
pub fn cmd_unlock_store(ctx: &QueueContext, args: UnlockStoreArgs) -> Result<Value> {
    let cleared = ctx.file_store().clear_lock(args.force)?;
    Ok(json!({ "cleared": cleared }))
}
