//! Background expiry sweep.

use super::coordinator::LockCoordinator;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Handle to the sweeper thread.
///
/// Dropping the handle (or calling [`SweeperHandle::stop`]) stops the thread
/// and joins it. The thread also exits on its own once the coordinator is gone.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the thread with `Disconnected`
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LockCoordinator {
    /// Start sweeping expired locks every `settings().sweep_interval`.
    pub fn start_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let interval = self.settings().sweep_interval;
        spawn_sweeper(Arc::downgrade(self), interval)
    }
}

fn spawn_sweeper(coordinator: Weak<LockCoordinator>, interval: Duration) -> SweeperHandle {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let thread = std::thread::spawn(move || {
        debug!(?interval, "lock sweeper started");
        loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(coordinator) = coordinator.upgrade() else {
                        break;
                    };
                    coordinator.sweep_expired();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("lock sweeper stopped");
    });

    SweeperHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
    }
}
