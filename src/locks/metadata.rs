//! Lock owner identity.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static HOST: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
});

/// Identifier of the execution context holding a lock.
///
/// The default owner is the calling thread (`host:pid:ThreadId(n)`). Callers
/// whose logical context is not a thread (request ids, job handles) build
/// their own with [`LockOwner::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockOwner(String);

impl LockOwner {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Owner string for the calling thread.
    pub fn current() -> Self {
        Self(format!(
            "{}:{}:{:?}",
            *HOST,
            std::process::id(),
            std::thread::current().id()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
