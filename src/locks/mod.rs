//! In-process lock coordinator.
//!
//! Serializes conflicting operations on shared resources (users, platforms,
//! tasks) inside one process.
//!
//! # Lock Identity
//!
//! A lock is identified by `(scope, resource_id, operation_kind)`. At most one
//! non-expired lock exists per key. Acquiring a key the caller already owns
//! succeeds and returns a non-owning guard (reentrancy); acquiring a key held
//! by someone else fails immediately with `ResourceLocked`.
//!
//! # Expiry
//!
//! Locks expire after their timeout (300s by default). Expired entries are
//! evicted lazily by `acquire`/`is_locked` and in bulk by the background
//! sweeper. Releasing an evicted lock is a no-op.
//!
//! # RAII Guards
//!
//! [`ScopedLock`] releases its lock on drop, including during unwinding.

mod coordinator;
mod guard;
mod history;
mod metadata;
mod sweeper;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use coordinator::{ConflictCallback, LockCoordinator, LockSettings};
pub use guard::ScopedLock;
pub use history::{HistoryEntry, LockAction};
pub use metadata::LockOwner;
pub use sweeper::SweeperHandle;
pub use types::{
    LockConflict, LockKey, LockRequest, LockScope, LockTimeout, OperationKind, OperationLock,
};
