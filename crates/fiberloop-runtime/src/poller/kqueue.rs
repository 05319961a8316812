//! kqueue(2) backend
//!
//! Read and write are separate filters, so each direction is registered
//! and deleted on its own. Changes are submitted as they happen rather
//! than batched into the next poll, which keeps `remove` synchronous.

use super::{Event, Interest, Poller};
use fiberloop_core::{Deadline, FiberError, FiberResult};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::{Duration, Instant};

/// Longest single wait handed to the kernel
const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Kqueue {
    kq: OwnedFd,
    buffer: Vec<libc::kevent>,
}

impl Kqueue {
    pub fn new(batch: usize) -> FiberResult<Self> {
        // SAFETY: plain syscall
        let fd = unsafe { libc::kqueue() };
        if fd < 0 {
            return Err(FiberError::last_os_error());
        }
        // SAFETY: fd is a fresh descriptor nobody else owns
        let kq = unsafe { OwnedFd::from_raw_fd(fd) };
        // SAFETY: plain syscall on our own descriptor
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            return Err(FiberError::last_os_error());
        }
        Ok(Self {
            kq,
            // SAFETY: kevent is plain data; all-zero is a valid value
            buffer: vec![unsafe { std::mem::zeroed() }; batch.max(1)],
        })
    }

    fn change(&self, fd: RawFd, interest: Interest, flags: u32) -> FiberResult<()> {
        // SAFETY: as above
        let mut change: libc::kevent = unsafe { std::mem::zeroed() };
        change.ident = fd as _;
        change.filter = filter(interest) as _;
        change.flags = flags as _;

        // SAFETY: one valid change in, no event buffer out
        let rc = unsafe {
            libc::kevent(self.kq.as_raw_fd(), &change, 1, ptr::null_mut(), 0, ptr::null())
        };
        if rc < 0 {
            return Err(FiberError::last_os_error());
        }
        Ok(())
    }
}

fn filter(interest: Interest) -> i64 {
    match interest {
        Interest::Read => libc::EVFILT_READ as i64,
        Interest::Write => libc::EVFILT_WRITE as i64,
    }
}

impl Poller for Kqueue {
    fn poll(&mut self, deadline: Deadline, events: &mut Vec<Event>) -> FiberResult<usize> {
        events.clear();
        let count = loop {
            let timeout = deadline
                .timeout_from(Instant::now())
                .map(|left| left.min(MAX_TIMEOUT))
                .map(|left| libc::timespec {
                    tv_sec: left.as_secs() as libc::time_t,
                    tv_nsec: left.subsec_nanos() as _,
                });
            let timeout_ptr = timeout
                .as_ref()
                .map_or(ptr::null(), |ts| ts as *const libc::timespec);

            // SAFETY: the buffer holds `len` initialized kevents
            let rc = unsafe {
                libc::kevent(
                    self.kq.as_raw_fd(),
                    ptr::null(),
                    0,
                    self.buffer.as_mut_ptr(),
                    self.buffer.len() as _,
                    timeout_ptr,
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
            let flags = raw.flags as u32;
            let filter = raw.filter as i64;
            events.push(Event {
                fd: raw.ident as RawFd,
                readable: filter == libc::EVFILT_READ as i64,
                writable: filter == libc::EVFILT_WRITE as i64,
                error: flags & libc::EV_ERROR as u32 != 0,
            });
        }
        Ok(count)
    }

    fn add(&mut self, fd: RawFd, interest: Interest) -> FiberResult<()> {
        self.change(fd, interest, libc::EV_ADD as u32 | libc::EV_ENABLE as u32)
    }

    fn remove(&mut self, fd: RawFd, interest: Interest) -> FiberResult<()> {
        match self.change(fd, interest, libc::EV_DELETE as u32) {
            Err(e) if matches!(e.raw_os_error(), Some(libc::ENOENT | libc::EBADF)) => Ok(()),
            other => other,
        }
    }
}
