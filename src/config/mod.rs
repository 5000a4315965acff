//! Configuration model for captionq.
//!
//! This module defines the [`QueueConfig`] struct that represents `captionq.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for every field, and validation of config values.

mod model;
mod operations;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use model::QueueConfig;
pub use types::DEFAULT_CONFIG_FILE;
