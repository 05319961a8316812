//! Deadline-ordered sleep queue
//!
//! An intrusive doubly linked list threaded through the fibers' own
//! `SleepLink`s, so removal is O(1). Insertion appends when the deadline
//! is not earlier than the tail's (the common case: timeouts are mostly
//! "now + constant"), pushes to the head when it is earlier than the
//! head's, and otherwise scans from the head for the first strictly later
//! deadline. Equal deadlines keep insertion order.

use crate::fiber::Fiber;
use fiberloop_core::{Deadline, FiberId};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct SleepQueue {
    head: Option<FiberId>,
    tail: Option<FiberId>,
    len: usize,
}

impl SleepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Link `id` with `deadline`. A fiber already linked is moved.
    pub(crate) fn insert(&mut self, fibers: &mut [Fiber], id: FiberId, deadline: Deadline) {
        if fibers[id.as_usize()].sleep.linked {
            self.remove(fibers, id);
        }
        fibers[id.as_usize()].deadline = deadline;

        let (Some(head), Some(tail)) = (self.head, self.tail) else {
            self.link_between(fibers, id, None, None);
            return;
        };

        if deadline >= fibers[tail.as_usize()].deadline {
            self.link_between(fibers, id, Some(tail), None);
        } else if deadline < fibers[head.as_usize()].deadline {
            self.link_between(fibers, id, None, Some(head));
        } else {
            let mut cursor = fibers[head.as_usize()].sleep.next;
            while let Some(at) = cursor {
                if fibers[at.as_usize()].deadline > deadline {
                    break;
                }
                cursor = fibers[at.as_usize()].sleep.next;
            }
            // The tail check above guarantees a strictly later node exists
            let next = cursor.unwrap_or(tail);
            let prev = fibers[next.as_usize()].sleep.prev;
            self.link_between(fibers, id, prev, Some(next));
        }
    }

    fn link_between(
        &mut self,
        fibers: &mut [Fiber],
        id: FiberId,
        prev: Option<FiberId>,
        next: Option<FiberId>,
    ) {
        {
            let link = &mut fibers[id.as_usize()].sleep;
            link.prev = prev;
            link.next = next;
            link.linked = true;
        }
        match prev {
            Some(p) => fibers[p.as_usize()].sleep.next = Some(id),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => fibers[n.as_usize()].sleep.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    /// Unlink `id`; false if it was not queued
    pub(crate) fn remove(&mut self, fibers: &mut [Fiber], id: FiberId) -> bool {
        let link = fibers[id.as_usize()].sleep;
        if !link.linked {
            return false;
        }
        match link.prev {
            Some(p) => fibers[p.as_usize()].sleep.next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(n) => fibers[n.as_usize()].sleep.prev = link.prev,
            None => self.tail = link.prev,
        }
        fibers[id.as_usize()].sleep = Default::default();
        self.len -= 1;
        true
    }

    /// Earliest deadline, `Never` when empty
    pub(crate) fn first_deadline(&self, fibers: &[Fiber]) -> Deadline {
        self.head
            .map_or(Deadline::Never, |head| fibers[head.as_usize()].deadline)
    }

    /// Push every fiber whose deadline has passed onto `out`, earliest
    /// first. Fibers stay linked; the waiter unlinks itself on resume.
    pub(crate) fn collect_expired(&self, fibers: &[Fiber], now: Instant, out: &mut Vec<FiberId>) {
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let fiber = &fibers[id.as_usize()];
            if !fiber.deadline.is_elapsed(now) {
                break;
            }
            out.push(id);
            cursor = fiber.sleep.next;
        }
    }

    /// Every queued fiber in deadline order
    pub(crate) fn collect_all(&self, fibers: &[Fiber], out: &mut Vec<FiberId>) {
        let mut cursor = self.head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = fibers[id.as_usize()].sleep.next;
        }
    }
}
