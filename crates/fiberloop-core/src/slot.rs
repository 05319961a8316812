//! Slot cache for fiber reuse
//!
//! Hands out arena indices for fibers. Indices of finished fibers go on a
//! LIFO free stack and are handed out again before any fresh index, so the
//! most recently used stack (likely still warm) is reused first.
//!
//! Owned by a single scheduler, so no locking.

use crate::error::{FiberError, FiberResult};
use crate::id::FiberId;

/// Outcome of [`SlotCache::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A cached fiber whose stack can be reused as-is
    Reused(FiberId),
    /// A never-used index; the caller must allocate the fiber
    Fresh(FiberId),
}

impl Slot {
    #[inline]
    pub fn id(self) -> FiberId {
        match self {
            Slot::Reused(id) | Slot::Fresh(id) => id,
        }
    }
}

pub struct SlotCache {
    /// LIFO stack of cached ids
    free: Vec<FiberId>,

    /// Next fresh index (0 belongs to root)
    next_fresh: u32,

    /// Maximum number of fibers, root excluded
    max_slots: u32,
}

impl SlotCache {
    pub fn new(max_slots: usize) -> Self {
        Self {
            free: Vec::new(),
            next_fresh: 1,
            max_slots: max_slots.min(u32::MAX as usize - 1) as u32,
        }
    }

    /// Take a cached slot, or a fresh one if the cache is empty
    pub fn acquire(&mut self) -> FiberResult<Slot> {
        if let Some(id) = self.free.pop() {
            return Ok(Slot::Reused(id));
        }
        if self.next_fresh > self.max_slots {
            return Err(FiberError::NoSlotsAvailable);
        }
        let id = FiberId::new(self.next_fresh);
        self.next_fresh += 1;
        Ok(Slot::Fresh(id))
    }

    /// Undo a fresh acquisition whose fiber could not be built
    pub fn abandon_fresh(&mut self, id: FiberId) {
        if id.as_u32() + 1 == self.next_fresh {
            self.next_fresh -= 1;
        }
    }

    /// Put a finished fiber back
    #[inline]
    pub fn release(&mut self, id: FiberId) {
        debug_assert!(!id.is_root());
        self.free.push(id);
    }

    /// Number of fibers waiting for reuse
    #[inline]
    pub fn cached(&self) -> usize {
        self.free.len()
    }

    /// Number of fibers ever created, root excluded
    #[inline]
    pub fn created(&self) -> usize {
        (self.next_fresh - 1) as usize
    }

    #[inline]
    pub fn max_slots(&self) -> usize {
        self.max_slots as usize
    }
}
