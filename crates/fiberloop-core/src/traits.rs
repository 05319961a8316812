//! Scheduler capability traits
//!
//! [`FiberContext`] is the seam between the platform-agnostic primitives in
//! this crate (`Channel`, `Broadcast`) and the scheduler in
//! `fiberloop-runtime`. The primitives only need to know who is running,
//! how to park that fiber, and how to wake another one.

use crate::id::FiberId;
use crate::state::FiberState;
use std::rc::Rc;

pub trait FiberContext {
    /// Fiber currently executing
    fn running(&self) -> FiberId;

    /// Park the running fiber until someone schedules it; returns the
    /// state it was scheduled with
    fn suspend(&self) -> FiberState;

    /// Queue `fiber` to resume with `state`. Returns false if it was not
    /// queued (already pending, or not a suspended fiber).
    fn schedule(&self, fiber: FiberId, state: FiberState) -> bool;
}

impl<C: FiberContext + ?Sized> FiberContext for Rc<C> {
    #[inline]
    fn running(&self) -> FiberId {
        (**self).running()
    }

    #[inline]
    fn suspend(&self) -> FiberState {
        (**self).suspend()
    }

    #[inline]
    fn schedule(&self, fiber: FiberId, state: FiberState) -> bool {
        (**self).schedule(fiber, state)
    }
}

impl<C: FiberContext + ?Sized> FiberContext for &C {
    #[inline]
    fn running(&self) -> FiberId {
        (**self).running()
    }

    #[inline]
    fn suspend(&self) -> FiberState {
        (**self).suspend()
    }

    #[inline]
    fn schedule(&self, fiber: FiberId, state: FiberState) -> bool {
        (**self).schedule(fiber, state)
    }
}
