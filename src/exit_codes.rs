//! Exit code constants for the captionq CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unknown task, invalid state)
//! - 2: Conflict (user already has an active task)
//! - 3: Record store failure
//! - 4: Lock acquisition failure (resource locked or lock capacity reached)
//! - 5: Caller is not an administrator

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid task or config.
pub const USER_ERROR: i32 = 1;

/// The user already owns a QUEUED or RUNNING task.
pub const CONFLICT: i32 = 2;

/// The record store could not be read or written.
pub const STORE_FAILURE: i32 = 3;

/// Lock acquisition failure: the resource is held or the lock table is full.
pub const LOCK_FAILURE: i32 = 4;

/// An admin operation was attempted without an administrator role.
pub const NOT_AUTHORIZED: i32 = 5;
