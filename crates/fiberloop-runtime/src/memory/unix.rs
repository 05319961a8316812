//! Unix stack mapping using mmap

use fiberloop_core::error::{FiberResult, MemoryError};
use std::ptr::NonNull;
use std::sync::OnceLock;

pub(super) fn page_size() -> usize {
    static PAGE: OnceLock<usize> = OnceLock::new();
    *PAGE.get_or_init(|| {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            fiberloop_core::constants::GUARD_SIZE
        }
    })
}

/// Reserve `len` bytes with no access rights
pub(super) fn map_reserved(len: usize) -> FiberResult<NonNull<u8>> {
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | map_noreserve(),
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(MemoryError::AllocationFailed.into());
    }
    NonNull::new(base as *mut u8).ok_or_else(|| MemoryError::AllocationFailed.into())
}

pub(super) fn make_accessible(start: *mut u8, len: usize) -> FiberResult<()> {
    let ret = unsafe {
        libc::mprotect(
            start as *mut libc::c_void,
            len,
            libc::PROT_READ | libc::PROT_WRITE,
        )
    };
    if ret != 0 {
        return Err(MemoryError::ProtectionFailed.into());
    }
    Ok(())
}

pub(super) fn unmap(base: NonNull<u8>, len: usize) -> FiberResult<()> {
    let ret = unsafe { libc::munmap(base.as_ptr() as *mut libc::c_void, len) };
    if ret != 0 {
        return Err(fiberloop_core::FiberError::last_os_error());
    }
    Ok(())
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        #[inline]
        fn map_noreserve() -> libc::c_int {
            libc::MAP_NORESERVE
        }
    } else {
        #[inline]
        fn map_noreserve() -> libc::c_int {
            0
        }
    }
}
