//! Cooperative fiber scheduler
//!
//! One scheduler per thread. Fibers live in an arena indexed by
//! [`FiberId`]; slot 0 is root, the thread's own stack. Exactly one fiber
//! runs at a time and control only moves on explicit transfers:
//!
//! - `spawn` transfers from the running fiber into the new one
//! - `park` (`suspend`, `yield_now`, task completion) transfers back to
//!   the parked fiber's `caller`
//! - `run_ready_chain` links the queued fibers through their `caller`
//!   fields and transfers into the first; each one parks into the next
//!   and the last parks into root
//!
//! A task panic is caught at the fiber boundary, stored, and raised again
//! once control is back on root.

use crate::arch::{self, Context};
use crate::config::RuntimeConfig;
use crate::fiber::Fiber;
use crate::memory::Stack;

use fiberloop_core::slot::{Slot, SlotCache};
use fiberloop_core::{kdebug, kfatal, kprint, ktrace};
use fiberloop_core::{FiberContext, FiberId, FiberResult, FiberState};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

pub struct Scheduler {
    fibers: RefCell<Vec<Fiber>>,
    cache: RefCell<SlotCache>,
    ready: RefCell<Vec<FiberId>>,
    running: Cell<FiberId>,
    /// First task panic not yet raised on root
    panic: RefCell<Option<Box<dyn Any + Send>>>,
    stack_size: usize,
}

impl Scheduler {
    /// The arena hands `self`'s address to every fiber entry, so the
    /// scheduler is only ever built behind an `Rc`.
    pub fn new(config: &RuntimeConfig) -> Rc<Self> {
        Rc::new(Self {
            fibers: RefCell::new(vec![Fiber::root()]),
            cache: RefCell::new(SlotCache::new(config.max_fibers)),
            ready: RefCell::new(Vec::new()),
            running: Cell::new(FiberId::ROOT),
            panic: RefCell::new(None),
            stack_size: config.stack_size,
        })
    }

    /// Start `task` in a fiber and run it until it finishes or parks.
    pub fn spawn<F>(&self, task: F) -> FiberResult<FiberId>
    where
        F: FnOnce() + 'static,
    {
        let caller = self.running.get();
        let id = self.prepare(Box::new(task), caller)?;
        ktrace!("spawn {} from {}", id, caller);
        self.call(id);
        self.raise_on_root();
        Ok(id)
    }

    fn prepare(&self, task: Box<dyn FnOnce()>, caller: FiberId) -> FiberResult<FiberId> {
        let slot = self.cache.borrow_mut().acquire()?;
        match slot {
            Slot::Reused(id) => {
                self.fibers.borrow_mut()[id.as_usize()].arm(task, caller);
                Ok(id)
            }
            Slot::Fresh(id) => {
                let stack = match Stack::allocate(self.stack_size) {
                    Ok(stack) => stack,
                    Err(e) => {
                        self.cache.borrow_mut().abandon_fresh(id);
                        return Err(e);
                    }
                };
                let mut fiber = Fiber::new(id, stack);
                let top = fiber.stack.as_ref().map_or(ptr::null_mut(), Stack::top);
                // SAFETY: `top` is the high end of the fiber's freshly
                // mapped stack, and `self` outlives every fiber it owns.
                unsafe {
                    arch::init_context(
                        &mut fiber.context,
                        top,
                        fiber_main,
                        self as *const Scheduler as usize,
                    );
                }
                fiber.arm(task, caller);

                let mut fibers = self.fibers.borrow_mut();
                debug_assert_eq!(fibers.len(), id.as_usize());
                fibers.push(fiber);
                kdebug!("fiber {} created ({} KiB stack)", id, self.stack_size / 1024);
                Ok(id)
            }
        }
    }

    /// Park the running fiber until it is scheduled again.
    #[inline]
    pub fn suspend(&self) -> FiberState {
        self.park(FiberState::Sleep)
    }

    /// Queue the running fiber and give the rest of the chain a turn. The
    /// fiber resumes in the next chain, usually with `Ready`.
    pub fn yield_now(&self) -> FiberState {
        let id = self.running.get();
        self.schedule(id, FiberState::Ready);
        self.park(FiberState::Ready)
    }

    /// Queue `id` to resume with `state`. No-op for root, cached fibers and
    /// fibers already queued.
    pub fn schedule(&self, id: FiberId, state: FiberState) -> bool {
        if id.is_root() {
            return false;
        }
        {
            let mut fibers = self.fibers.borrow_mut();
            let Some(fiber) = fibers.get_mut(id.as_usize()) else {
                return false;
            };
            if fiber.queued || fiber.state == FiberState::Cached {
                return false;
            }
            fiber.state = state;
            fiber.queued = true;
        }
        self.ready.borrow_mut().push(id);
        true
    }

    /// Run every fiber queued so far, in FIFO order. Fibers queued while
    /// the chain runs wait for the next call. Root only.
    pub fn run_ready_chain(&self) {
        if !self.running.get().is_root() {
            kfatal!("ready chain started from fiber {}", self.running.get());
        }
        let chain = std::mem::take(&mut *self.ready.borrow_mut());
        let first = {
            let mut fibers = self.fibers.borrow_mut();
            let chain: Vec<FiberId> = chain
                .into_iter()
                .filter(|id| {
                    let fiber = &mut fibers[id.as_usize()];
                    if fiber.state == FiberState::Cached {
                        fiber.queued = false;
                        return false;
                    }
                    true
                })
                .collect();
            for pair in chain.windows(2) {
                fibers[pair[0].as_usize()].caller = Some(pair[1]);
            }
            match (chain.first(), chain.last()) {
                (Some(&first), Some(&last)) => {
                    fibers[last.as_usize()].caller = Some(FiberId::ROOT);
                    first
                }
                _ => return,
            }
        };
        self.call(first);
        self.raise_on_root();
    }

    /// Drain the ready queue, chain after chain.
    pub fn run(&self) {
        while self.has_ready() {
            self.run_ready_chain();
        }
    }

    /// Mark every queued fiber `Canceled` in place.
    pub(crate) fn cancel_ready(&self) {
        let ready = self.ready.borrow();
        let mut fibers = self.fibers.borrow_mut();
        for id in ready.iter() {
            fibers[id.as_usize()].state = FiberState::Canceled;
        }
    }

    pub(crate) fn with_fibers<R>(&self, f: impl FnOnce(&mut [Fiber]) -> R) -> R {
        f(&mut self.fibers.borrow_mut())
    }

    // Introspection

    #[inline]
    pub fn running(&self) -> FiberId {
        self.running.get()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.running.get().is_root()
    }

    #[inline]
    pub fn has_ready(&self) -> bool {
        !self.ready.borrow().is_empty()
    }

    #[inline]
    pub fn ready_count(&self) -> usize {
        self.ready.borrow().len()
    }

    /// Fibers ever created, root excluded
    pub fn fiber_count(&self) -> usize {
        self.fibers.borrow().len() - 1
    }

    pub fn cached_count(&self) -> usize {
        self.cache.borrow().cached()
    }

    pub fn state(&self, id: FiberId) -> Option<FiberState> {
        self.fibers.borrow().get(id.as_usize()).map(Fiber::state)
    }

    // Transfers

    fn call(&self, id: FiberId) {
        let from = self.running.replace(id);
        self.transfer(from, id);
    }

    /// Leave the running fiber with `state` and continue its caller.
    /// Returns the state the fiber is resumed with.
    fn park(&self, state: FiberState) -> FiberState {
        let child = self.running.get();
        let parent = {
            let mut fibers = self.fibers.borrow_mut();
            let fiber = &mut fibers[child.as_usize()];
            let Some(parent) = fiber.caller.take() else {
                drop(fibers);
                kfatal!("fiber {} suspended with no caller", child);
            };
            fiber.caller = Some(FiberId::ROOT);
            fiber.state = state;
            parent
        };
        self.running.set(parent);
        self.transfer(child, parent);
        self.fibers.borrow()[child.as_usize()].state
    }

    fn transfer(&self, from: FiberId, to: FiberId) {
        let (old, new) = {
            let mut fibers = self.fibers.borrow_mut();
            fibers[to.as_usize()].queued = false;
            let base = fibers.as_mut_ptr();
            // SAFETY: both indices are in bounds; the pointers are used
            // only by the switch below, while nothing touches the arena.
            unsafe {
                (
                    ptr::addr_of_mut!((*base.add(from.as_usize())).context),
                    ptr::addr_of!((*base.add(to.as_usize())).context) as *const Context,
                )
            }
        };
        kprint::set_fiber_tag(to.as_u32());
        // SAFETY: `new` was produced by init_context or a previous switch
        // and its stack is owned by the arena.
        unsafe { arch::switch_context(old, new) };
    }

    fn lifecycle(&self) -> ! {
        loop {
            let id = self.running.get();
            let task = self.fibers.borrow_mut()[id.as_usize()].task.take();
            let Some(task) = task else {
                kfatal!("fiber {} resumed without a task", id);
            };

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                kdebug!("fiber {} panicked", id);
                let mut slot = self.panic.borrow_mut();
                if slot.is_none() {
                    *slot = Some(payload);
                }
            }

            {
                let mut fibers = self.fibers.borrow_mut();
                let fiber = &mut fibers[id.as_usize()];
                fiber.state = FiberState::Cached;
                if fiber.queued {
                    fiber.queued = false;
                    self.ready.borrow_mut().retain(|&queued| queued != id);
                }
            }
            self.cache.borrow_mut().release(id);
            self.park(FiberState::Cached);
        }
    }

    fn raise_on_root(&self) {
        if !self.running.get().is_root() {
            return;
        }
        let payload = self.panic.borrow_mut().take();
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }
}

extern "C" fn fiber_main(arg: usize) -> ! {
    // SAFETY: `arg` is the address of the Rc-owned scheduler that built
    // this fiber, and the scheduler outlives its arena.
    let scheduler = unsafe { &*(arg as *const Scheduler) };
    scheduler.lifecycle()
}

impl FiberContext for Scheduler {
    #[inline]
    fn running(&self) -> FiberId {
        Scheduler::running(self)
    }

    #[inline]
    fn suspend(&self) -> FiberState {
        Scheduler::suspend(self)
    }

    #[inline]
    fn schedule(&self, fiber: FiberId, state: FiberState) -> bool {
        Scheduler::schedule(self, fiber, state)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.running.get())
            .field("fibers", &self.fiber_count())
            .field("cached", &self.cached_count())
            .field("ready", &self.ready_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn scheduler() -> Rc<Scheduler> {
        Scheduler::new(&RuntimeConfig::new().stack_size(64 * 1024))
    }

    #[test]
    fn test_spawn_runs_until_park() {
        let sched = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&sched);
        let l = Rc::clone(&log);
        let id = sched
            .spawn(move || {
                l.borrow_mut().push("start");
                let state = s.suspend();
                assert_eq!(state, FiberState::Ready);
                l.borrow_mut().push("resumed");
            })
            .unwrap();

        assert_eq!(*log.borrow(), vec!["start"]);
        assert_eq!(sched.state(id), Some(FiberState::Sleep));
        assert!(sched.is_root());

        assert!(sched.schedule(id, FiberState::Ready));
        sched.run_ready_chain();
        assert_eq!(*log.borrow(), vec!["start", "resumed"]);
        assert_eq!(sched.state(id), Some(FiberState::Cached));
    }

    #[test]
    fn test_yield_interleaves_counter() {
        let sched = scheduler();
        let trace = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b"] {
            let s = Rc::clone(&sched);
            let t = Rc::clone(&trace);
            sched
                .spawn(move || {
                    for i in 0..3 {
                        t.borrow_mut().push(format!("{name}{i}"));
                        s.yield_now();
                    }
                })
                .unwrap();
        }
        sched.run();

        assert_eq!(
            *trace.borrow(),
            vec!["a0", "b0", "a1", "b1", "a2", "b2"]
        );
    }

    #[test]
    fn test_chain_preserves_schedule_order() {
        let sched = scheduler();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut ids = Vec::new();

        for n in 0..4 {
            let s = Rc::clone(&sched);
            let o = Rc::clone(&order);
            ids.push(
                sched
                    .spawn(move || {
                        s.suspend();
                        o.borrow_mut().push(n);
                    })
                    .unwrap(),
            );
        }
        for &id in ids.iter().rev() {
            sched.schedule(id, FiberState::Ready);
        }
        sched.run_ready_chain();
        assert_eq!(*order.borrow(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_yield_defers_to_next_chain() {
        let sched = scheduler();
        let passes = Rc::new(Cell::new(0));

        let s = Rc::clone(&sched);
        let p = Rc::clone(&passes);
        sched
            .spawn(move || loop {
                p.set(p.get() + 1);
                s.yield_now();
            })
            .unwrap();

        assert_eq!(passes.get(), 1);
        sched.run_ready_chain();
        assert_eq!(passes.get(), 2);
        assert_eq!(sched.ready_count(), 1);
        sched.run_ready_chain();
        assert_eq!(passes.get(), 3);
    }

    #[test]
    fn test_schedule_is_deduplicated() {
        let sched = scheduler();
        let s = Rc::clone(&sched);
        let id = sched
            .spawn(move || {
                s.suspend();
            })
            .unwrap();

        assert!(sched.schedule(id, FiberState::Expired));
        assert!(!sched.schedule(id, FiberState::Ready));
        assert!(!sched.schedule(FiberId::ROOT, FiberState::Ready));
        assert_eq!(sched.ready_count(), 1);
        assert_eq!(sched.state(id), Some(FiberState::Expired));
        sched.run_ready_chain();
        assert!(!sched.schedule(id, FiberState::Ready));
    }

    #[test]
    fn test_nested_spawn_returns_to_spawner() {
        let sched = scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&sched);
        let l = Rc::clone(&log);
        sched
            .spawn(move || {
                l.borrow_mut().push("outer");
                let l2 = Rc::clone(&l);
                let s2 = Rc::clone(&s);
                s.spawn(move || {
                    l2.borrow_mut().push("inner");
                    s2.suspend();
                })
                .unwrap();
                l.borrow_mut().push("outer again");
            })
            .unwrap();

        assert_eq!(*log.borrow(), vec!["outer", "inner", "outer again"]);
    }

    #[test]
    fn test_finished_fibers_are_reused() {
        let sched = scheduler();
        let first = sched.spawn(|| {}).unwrap();
        assert_eq!(sched.cached_count(), 1);
        let second = sched.spawn(|| {}).unwrap();
        assert_eq!(first, second);
        assert_eq!(sched.fiber_count(), 1);
    }

    #[test]
    fn test_fiber_limit() {
        let sched = Scheduler::new(&RuntimeConfig::new().stack_size(64 * 1024).max_fibers(1));
        let s = Rc::clone(&sched);
        sched.spawn(move || {
            s.suspend();
        })
        .unwrap();
        assert_eq!(
            sched.spawn(|| {}).unwrap_err(),
            fiberloop_core::FiberError::NoSlotsAvailable
        );
    }

    #[test]
    fn test_task_panic_reaches_root() {
        let sched = scheduler();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            sched.spawn(|| panic!("boom")).unwrap();
        }));
        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

        // The fiber was still recycled
        assert_eq!(sched.cached_count(), 1);
        assert!(sched.spawn(|| {}).is_ok());
    }
}
