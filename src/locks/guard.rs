//! RAII lock guard implementation.

use super::coordinator::LockCoordinator;
use super::types::OperationLock;

/// RAII guard for a coordinator lock.
///
/// When dropped (normal return, `?` early return or unwinding panic), the lock
/// is released. A guard obtained through a reentrant acquisition does not own
/// the lock: only the outermost guard releases it.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ScopedLock<'a> {
    coordinator: &'a LockCoordinator,
    lock: OperationLock,
    owns: bool,
    released: bool,
}

impl<'a> ScopedLock<'a> {
    pub(super) fn owned(coordinator: &'a LockCoordinator, lock: OperationLock) -> Self {
        Self {
            coordinator,
            lock,
            owns: true,
            released: false,
        }
    }

    pub(super) fn reentrant(coordinator: &'a LockCoordinator, lock: OperationLock) -> Self {
        Self {
            coordinator,
            lock,
            owns: false,
            released: false,
        }
    }

    pub fn lock(&self) -> &OperationLock {
        &self.lock
    }

    pub fn lock_id(&self) -> &str {
        &self.lock.lock_id
    }

    /// Whether this guard re-entered a lock the owner already held.
    pub fn is_reentrant(&self) -> bool {
        !self.owns
    }

    /// Manually release the lock before the guard goes out of scope.
    ///
    /// Returns whether a live lock was removed. A reentrant guard never
    /// removes anything.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.owns && self.coordinator.release(&self.lock.lock_id)
    }
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        if self.owns && !self.released {
            self.coordinator.release(&self.lock.lock_id);
        }
    }
}
