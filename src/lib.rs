//! captionq: single-active-task-per-user job queue for caption generation.
//!
//! The crate is organised around three pieces:
//!
//! - [`locks`]: an in-process coordinator that serializes conflicting
//!   operations on users, tasks, platforms and the system.
//! - [`queue`]: the task queue manager, built on a pluggable [`store`].
//! - [`commands`]: the CLI surface over a shared JSON record store.

pub mod audit;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod locks;
pub mod logging;
pub mod queue;
pub mod store;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;
