//! Thin OS wrappers: descriptor limit and pipes

use fiberloop_core::{FiberError, FiberResult};
use nix::errno::Errno;
use nix::sys::resource::{getrlimit, Resource};
use std::os::fd::OwnedFd;

#[inline]
pub(crate) fn os_error(errno: Errno) -> FiberError {
    FiberError::Os(errno as i32)
}

/// Hard `RLIMIT_NOFILE`, saturated to `usize`
pub fn descriptor_limit() -> FiberResult<usize> {
    let (_soft, hard) =
        getrlimit(Resource::RLIMIT_NOFILE).map_err(os_error)?;
    Ok(usize::try_from(hard).unwrap_or(usize::MAX))
}

/// Anonymous pipe as (read end, write end), both close-on-exec
pub fn pipe() -> FiberResult<(OwnedFd, OwnedFd)> {
    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "macos", target_os = "ios"))] {
            use nix::fcntl::{fcntl, FcntlArg, FdFlag};
            use std::os::fd::AsRawFd;

            let (read, write) = nix::unistd::pipe().map_err(os_error)?;
            for end in [&read, &write] {
                fcntl(end.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
                    .map_err(os_error)?;
            }
            Ok((read, write))
        } else {
            use nix::fcntl::OFlag;

            nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(os_error)
        }
    }
}
