//! epoll(7) backend

use super::{Event, Interest, Poller};
use fiberloop_core::{Deadline, FiberError, FiberResult};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Instant;

pub struct Epoll {
    epfd: OwnedFd,
    /// Interest mask currently registered per descriptor
    interests: HashMap<RawFd, u32>,
    buffer: Vec<libc::epoll_event>,
}

impl Epoll {
    pub fn new(batch: usize) -> FiberResult<Self> {
        // SAFETY: plain syscall
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(FiberError::last_os_error());
        }
        // SAFETY: fd is a fresh descriptor nobody else owns
        let epfd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            epfd,
            interests: HashMap::new(),
            buffer: vec![libc::epoll_event { events: 0, u64: 0 }; batch.max(1)],
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, mask: u32) -> FiberResult<()> {
        let mut event = libc::epoll_event {
            events: mask,
            u64: fd as u64,
        };
        // SAFETY: event is a valid epoll_event for the duration of the call
        let rc = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(FiberError::last_os_error());
        }
        Ok(())
    }

    /// Update the kernel registration of `fd` from `old` to `new` mask
    fn apply(&mut self, fd: RawFd, old: u32, new: u32) -> FiberResult<()> {
        let op = match (old, new) {
            (0, 0) => return Ok(()),
            (0, _) => libc::EPOLL_CTL_ADD,
            (_, 0) => libc::EPOLL_CTL_DEL,
            _ => libc::EPOLL_CTL_MOD,
        };
        match self.ctl(op, fd, new) {
            // Closing a descriptor drops its registration in the kernel; a
            // reused number shows up here as a stale MOD
            Err(e) if op == libc::EPOLL_CTL_MOD && e.raw_os_error() == Some(libc::ENOENT) => {
                self.ctl(libc::EPOLL_CTL_ADD, fd, new)?
            }
            other => other?,
        }
        if new == 0 {
            self.interests.remove(&fd);
        } else {
            self.interests.insert(fd, new);
        }
        Ok(())
    }
}

fn mask(interest: Interest) -> u32 {
    match interest {
        Interest::Read => libc::EPOLLIN as u32,
        Interest::Write => libc::EPOLLOUT as u32,
    }
}

/// Milliseconds until `deadline`, rounded up; -1 waits forever
fn timeout_ms(deadline: Deadline, now: Instant) -> libc::c_int {
    match deadline.timeout_from(now) {
        None => -1,
        Some(left) => {
            let ms = left.as_nanos().div_ceil(1_000_000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

impl Poller for Epoll {
    fn poll(&mut self, deadline: Deadline, events: &mut Vec<Event>) -> FiberResult<usize> {
        events.clear();
        let count = loop {
            let timeout = timeout_ms(deadline, Instant::now());
            // SAFETY: the buffer holds `len` initialized epoll_events
            let rc = unsafe {
                libc::epoll_wait(
                    self.epfd.as_raw_fd(),
                    self.buffer.as_mut_ptr(),
                    self.buffer.len() as libc::c_int,
                    timeout,
                )
            };
            if rc >= 0 {
                break rc as usize;
            }
            let err = FiberError::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        };

        for raw in &self.buffer[..count] {
            // epoll_event is packed on x86_64; copy out before use
            let bits = raw.events;
            let data = raw.u64;
            events.push(Event {
                fd: data as RawFd,
                readable: bits & libc::EPOLLIN as u32 != 0,
                writable: bits & libc::EPOLLOUT as u32 != 0,
                error: bits & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0,
            });
        }
        Ok(count)
    }

    fn add(&mut self, fd: RawFd, interest: Interest) -> FiberResult<()> {
        let old = self.interests.get(&fd).copied().unwrap_or(0);
        self.apply(fd, old, old | mask(interest))
    }

    fn remove(&mut self, fd: RawFd, interest: Interest) -> FiberResult<()> {
        let Some(&old) = self.interests.get(&fd) else {
            return Ok(());
        };
        let new = old & !mask(interest);
        if new == old {
            return Ok(());
        }
        match self.apply(fd, old, new) {
            // Descriptor closed behind our back; the kernel already forgot it
            Err(e) if matches!(e.raw_os_error(), Some(libc::ENOENT | libc::EBADF)) => {
                self.interests.remove(&fd);
                Ok(())
            }
            other => other,
        }
    }
}
