//! Fiber stack memory
//!
//! Every fiber owns one [`Stack`]: a private anonymous mapping with an
//! inaccessible guard page at the low end, so overflowing the stack faults
//! instead of silently corrupting a neighbour.
//!
//! ```text
//!   base                 base + guard                     top
//!    │  guard (PROT_NONE)  │      usable (READ|WRITE)  ◄── grows down
//!    └─────────────────────┴───────────────────────────────┘
//! ```
//!
//! Lifecycle: `reserve` maps the whole span inaccessible, `protect` opens
//! the usable part, `release` (or drop) unmaps it.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as sys;
    } else {
        compile_error!("fiberloop stacks require a unix target");
    }
}

use fiberloop_core::constants::MIN_STACK_SIZE;
use fiberloop_core::error::{FiberResult, MemoryError};
use std::ptr::NonNull;

pub struct Stack {
    base: NonNull<u8>,
    /// Whole mapping, guard included
    len: usize,
    guard: usize,
    protected: bool,
}

impl Stack {
    /// Map and open a stack with at least `usable` bytes
    pub fn allocate(usable: usize) -> FiberResult<Stack> {
        let mut stack = Stack::reserve(usable)?;
        stack.protect()?;
        Ok(stack)
    }

    /// Map an inaccessible span for a stack of at least `usable` bytes
    pub fn reserve(usable: usize) -> FiberResult<Stack> {
        if usable == 0 {
            return Err(MemoryError::InvalidSize.into());
        }
        let page = sys::page_size();
        let usable = round_up(usable.max(MIN_STACK_SIZE), page).ok_or(MemoryError::InvalidSize)?;
        let len = usable.checked_add(page).ok_or(MemoryError::InvalidSize)?;

        let base = sys::map_reserved(len)?;
        Ok(Stack {
            base,
            len,
            guard: page,
            protected: false,
        })
    }

    /// Make everything above the guard page readable and writable
    pub fn protect(&mut self) -> FiberResult<()> {
        if self.protected {
            return Ok(());
        }
        sys::make_accessible(self.bottom(), self.usable_size())?;
        self.protected = true;
        Ok(())
    }

    /// Unmap now instead of at drop
    pub fn release(self) {
        drop(self);
    }

    /// High end, where the stack pointer starts
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.len) }
    }

    /// Lowest usable byte, just above the guard page
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.guard) }
    }

    #[inline]
    pub fn usable_size(&self) -> usize {
        self.len - self.guard
    }

    #[inline]
    pub fn guard_size(&self) -> usize {
        self.guard
    }

    #[inline]
    pub fn is_protected(&self) -> bool {
        self.protected
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if let Err(e) = sys::unmap(self.base, self.len) {
            fiberloop_core::kerror!("failed to unmap fiber stack: {}", e);
        }
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("usable", &self.usable_size())
            .field("protected", &self.protected)
            .finish()
    }
}

fn round_up(n: usize, align: usize) -> Option<usize> {
    Some(n.checked_add(align - 1)? & !(align - 1))
}

pub fn page_size() -> usize {
    sys::page_size()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_are_page_rounded() {
        let page = page_size();
        let stack = Stack::allocate(MIN_STACK_SIZE + 1).unwrap();
        assert_eq!(stack.usable_size() % page, 0);
        assert!(stack.usable_size() > MIN_STACK_SIZE);
        assert_eq!(stack.guard_size(), page);
        assert_eq!(stack.top() as usize - stack.bottom() as usize, stack.usable_size());
    }

    #[test]
    fn test_small_requests_get_minimum() {
        let stack = Stack::allocate(1).unwrap();
        assert!(stack.usable_size() >= MIN_STACK_SIZE);
    }

    #[test]
    fn test_usable_range_is_writable() {
        let stack = Stack::allocate(64 * 1024).unwrap();
        unsafe {
            stack.bottom().write(0xAB);
            stack.top().sub(1).write(0xCD);
            assert_eq!(stack.bottom().read(), 0xAB);
            assert_eq!(stack.top().sub(1).read(), 0xCD);
        }
    }

    #[test]
    fn test_reserve_then_protect() {
        let mut stack = Stack::reserve(32 * 1024).unwrap();
        assert!(!stack.is_protected());
        stack.protect().unwrap();
        stack.protect().unwrap();
        assert!(stack.is_protected());
        stack.release();
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            Stack::allocate(0),
            Err(fiberloop_core::FiberError::Memory(MemoryError::InvalidSize))
        ));
    }
}
