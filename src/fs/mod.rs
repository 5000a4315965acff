//! Filesystem utilities for captionq.
//!
//! Atomic writes keep the JSON record store from ever being observed
//! half-written.

pub mod atomic;

pub use atomic::atomic_write;
