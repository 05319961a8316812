//! Readiness polling
//!
//! Level-triggered readiness for the event loop, one backend per
//! platform family:
//!
//! - Linux: `epoll`, with read and write interest folded into one
//!   registration per descriptor
//! - macOS and the BSDs: `kqueue`, one filter per direction
//!
//! Both report normalized [`Event`]s and retry `EINTR` internally with a
//! timeout recomputed from the deadline.

use fiberloop_core::{Deadline, FiberResult};
use std::os::fd::RawFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Read,
    Write,
}

/// Readiness of one descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    /// Error or hangup; wakes both directions
    pub error: bool,
}

pub trait Poller {
    /// Wait until `deadline` for readiness and refill `events`; returns the
    /// number of events
    fn poll(&mut self, deadline: Deadline, events: &mut Vec<Event>) -> FiberResult<usize>;

    /// Start watching `fd` for `interest`
    fn add(&mut self, fd: RawFd, interest: Interest) -> FiberResult<()>;

    /// Stop watching `fd` for `interest`. Removing a registration that was
    /// never added is a no-op.
    fn remove(&mut self, fd: RawFd, interest: Interest) -> FiberResult<()>;

    /// Drop both directions, ignoring errors
    fn clear(&mut self, fd: RawFd) {
        let _ = self.remove(fd, Interest::Read);
        let _ = self.remove(fd, Interest::Write);
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod epoll;
        pub use epoll::Epoll as PlatformPoller;
    } else if #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly",
    ))] {
        mod kqueue;
        pub use kqueue::Kqueue as PlatformPoller;
    } else {
        compile_error!("fiberloop needs epoll or kqueue");
    }
}
