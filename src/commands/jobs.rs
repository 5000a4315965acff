//! Owner and worker commands: `enqueue`, `next`, `complete`, `cancel`,
//! `show`, `history`.

use super::{QueueContext, to_json};
use crate::cli::{CancelArgs, CompleteArgs, EnqueueArgs, HistoryArgs, ShowArgs};
use crate::error::{QueueError, Result};
use crate::task::{Task, TaskId};
use serde_json::{Value, json};

/// Execute the `captionq enqueue` command.
pub fn cmd_enqueue(ctx: &QueueContext, args: EnqueueArgs) -> Result<Value> {
    let mut task = Task::new(args.user, args.platform)
        .with_settings(args.settings)
        .with_max_retries(args.max_retries.unwrap_or(ctx.config.default_max_retries));
    if let Some(raw_id) = &args.id {
        task = task.with_id(TaskId::parse(raw_id)?);
    }

    let task_id = ctx.manager.enqueue(task, args.priority)?;
    Ok(json!({ "task_id": task_id }))
}

/// Execute the `captionq next` command.
///
/// Prints `null` when nothing can be started.
pub fn cmd_next(ctx: &QueueContext) -> Result<Value> {
    let task = ctx.manager.get_next_task()?;
    to_json(&task)
}

/// Execute the `captionq complete` command.
pub fn cmd_complete(ctx: &QueueContext, args: CompleteArgs) -> Result<Value> {
    let finished = ctx
        .manager
        .complete(&args.task_id, !args.failed, args.error)?;
    if !finished {
        return Err(QueueError::UserError(format!(
            "task '{}' is not running.\n\n\
             Use `captionq show {}` to inspect it.",
            args.task_id, args.task_id
        )));
    }
    task_json(ctx, &args.task_id)
}

/// Execute the `captionq cancel` command.
pub fn cmd_cancel(ctx: &QueueContext, args: CancelArgs) -> Result<Value> {
    let cancelled = ctx
        .manager
        .cancel(&args.task_id, args.user, args.admin, args.reason)?;
    if !cancelled {
        return Err(QueueError::UserError(format!(
            "task '{}' was not cancelled: it does not exist, is already finished, \
             or belongs to another user",
            args.task_id
        )));
    }
    task_json(ctx, &args.task_id)
}

/// Execute the `captionq show` command.
pub fn cmd_show(ctx: &QueueContext, args: ShowArgs) -> Result<Value> {
    task_json(ctx, &args.task_id)
}

/// Execute the `captionq history` command.
pub fn cmd_history(ctx: &QueueContext, args: HistoryArgs) -> Result<Value> {
    let tasks = ctx.manager.get_user_task_history(args.user, args.limit)?;
    to_json(&tasks)
}

pub(super) fn task_json(ctx: &QueueContext, task_id: &str) -> Result<Value> {
    let task = ctx
        .manager
        .get_task(task_id)?
        .ok_or_else(|| QueueError::UserError(format!("task '{}' not found", task_id)))?;
    to_json(&task)
}
