//! # fiberloop
//!
//! Cooperative stackful fibers driven by a per-thread event loop.
//!
//! ## Features
//!
//! - **Stackful**: every fiber has its own mmap'd stack with a guard page;
//!   blocking calls are plain function calls, no `async` colouring
//! - **Deterministic**: fibers run in FIFO ready chains, one at a time,
//!   and only switch at explicit suspension points
//! - **I/O readiness**: `wait_readable`/`wait_writable` on any descriptor
//!   (epoll on Linux, kqueue on macOS and the BSDs)
//! - **Deadlines**: every wait is bounded by a [`Deadline`]
//! - **Synchronization**: bounded and rendezvous [`Channel`], [`Broadcast`]
//! - **Blocking offload**: [`run_blocking`] runs a closure on a thread pool
//!   while the loop keeps going
//!
//! ## Quick Start
//!
//! ```ignore
//! use fiberloop::{spawn, sleep_for, run, Channel};
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! fn main() {
//!     let ch = Rc::new(Channel::new(0));
//!
//!     let tx = Rc::clone(&ch);
//!     spawn(move || {
//!         for i in 0..3 {
//!             tx.write(i);
//!             sleep_for(Duration::from_millis(10));
//!         }
//!         tx.close();
//!     })
//!     .unwrap();
//!
//!     spawn(move || {
//!         while let Some(v) = ch.read() {
//!             println!("got {}", v);
//!         }
//!     })
//!     .unwrap();
//!
//!     run().unwrap();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │      spawn(), sleep(), wait_readable(), Channel, ...        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 EventLoop (one per thread)                  │
//! │    watcher table · sleep queue · poller · ready chain       │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────────┐
//!    │ Scheduler │      │  Poller   │      │ BlockingPool  │
//!    │  fibers   │      │epoll/kqueue│     │ worker threads│
//!    └───────────┘      └───────────┘      └───────────────┘
//! ```

// Re-export core types
pub use fiberloop_core::{
    Deadline,
    DispatchError,
    FiberContext,
    FiberError,
    FiberId,
    FiberResult,
    FiberState,
    MemoryError,
    WorkerError,
};

// Re-export kprint macros for debug logging
pub use fiberloop_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use fiberloop_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use fiberloop_core::{env_get, env_get_bool, env_get_duration_ms, env_get_opt, env_is_set};

// Re-export runtime types
pub use fiberloop_runtime::{
    current_loop,
    init_loop,
    BlockingPool,
    Broadcast,
    Channel,
    EventLoop,
    Handle,
    Interest,
    RuntimeConfig,
    Scheduler,
};

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Start `task` in a new fiber on this thread's loop.
///
/// The fiber runs right away, until it finishes or first blocks; `spawn`
/// returns at that point.
pub fn spawn<F>(task: F) -> FiberResult<FiberId>
where
    F: FnOnce() + 'static,
{
    current_loop().spawn(task)
}

/// Let the other ready fibers run; resumes in the next ready chain
pub fn yield_now() -> FiberState {
    current_loop().yield_now()
}

/// Sleep until `deadline`. Returns `Expired`, or `Canceled` when the loop
/// shuts down first.
pub fn sleep(deadline: Deadline) -> FiberState {
    current_loop().wait(deadline)
}

/// Sleep for `duration`, measured from the loop's clock
pub fn sleep_for(duration: Duration) -> FiberState {
    let lp = current_loop();
    lp.wait(Deadline::after_from(lp.now(), duration))
}

/// Loop clock, sampled once per iteration
pub fn now() -> Instant {
    current_loop().now()
}

/// Run this thread's loop until no fiber is left to run or `stop` is called
pub fn run() -> FiberResult<()> {
    current_loop().run()
}

/// Like [`run`], returning at `deadline` at the latest
pub fn run_until(deadline: Deadline) -> FiberResult<()> {
    current_loop().run_until(deadline)
}

/// Stop this thread's loop; pending fibers are resumed as `Canceled`
pub fn stop() {
    current_loop().stop()
}

/// Run `task` on the blocking pool, parking the calling fiber until it is
/// done or `deadline` passes
pub fn run_blocking<T, E, F>(deadline: Deadline, task: F) -> Result<T, DispatchError<E>>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    current_loop().run_blocking(deadline, task)
}

/// Park until `fd` is readable. `Err(Timeout)` once `deadline` passes.
pub fn wait_readable(fd: RawFd, deadline: Deadline) -> FiberResult<FiberState> {
    current_loop().wait_io(fd, Interest::Read, deadline)
}

/// Park until `fd` is writable. `Err(Timeout)` once `deadline` passes.
pub fn wait_writable(fd: RawFd, deadline: Deadline) -> FiberResult<FiberState> {
    current_loop().wait_io(fd, Interest::Write, deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn test_fibers_interleave_through_yield() {
        let counter = Rc::new(Cell::new(0));
        let trace = Rc::new(RefCell::new(Vec::new()));

        for name in ["first", "second"] {
            let (c, t) = (Rc::clone(&counter), Rc::clone(&trace));
            spawn(move || {
                for _ in 0..2 {
                    c.set(c.get() + 1);
                    t.borrow_mut().push((name, c.get()));
                    yield_now();
                }
            })
            .unwrap();
        }
        run().unwrap();

        assert_eq!(
            *trace.borrow(),
            vec![("first", 1), ("second", 2), ("first", 3), ("second", 4)]
        );
    }

    #[test]
    fn test_spawned_fiber_runs_before_spawn_returns() {
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        spawn(move || r.set(true)).unwrap();
        assert!(ran.get());
    }

    #[test]
    fn test_sleep_for_and_now() {
        let woke = Rc::new(Cell::new(None));
        let w = Rc::clone(&woke);
        let start = Instant::now();
        spawn(move || {
            let state = sleep_for(Duration::from_millis(15));
            w.set(Some((state, now())));
        })
        .unwrap();
        run().unwrap();

        let (state, at) = woke.get().unwrap();
        assert_eq!(state, FiberState::Expired);
        assert!(at.duration_since(start) >= Duration::from_millis(15));
    }

    #[test]
    fn test_stop_from_a_fiber() {
        let sleeper = Rc::new(Cell::new(None));
        let s = Rc::clone(&sleeper);
        spawn(move || s.set(Some(sleep(Deadline::Never)))).unwrap();
        spawn(|| {
            sleep_for(Duration::from_millis(5));
            stop();
        })
        .unwrap();
        run().unwrap();
        assert_eq!(sleeper.get(), Some(FiberState::Canceled));
    }

    #[test]
    fn test_run_until_returns_at_deadline() {
        spawn(|| {
            sleep(Deadline::Never);
        })
        .unwrap();
        let start = Instant::now();
        run_until(Deadline::after(Duration::from_millis(20))).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(15));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_readable_on_pipe() {
        let (read, write) = fiberloop_runtime::os::pipe().unwrap();
        let rfd = std::os::fd::AsRawFd::as_raw_fd(&read);
        let result = Rc::new(RefCell::new(None));

        let r = Rc::clone(&result);
        spawn(move || *r.borrow_mut() = Some(wait_readable(rfd, Deadline::Never))).unwrap();
        spawn(move || {
            let wfd = std::os::fd::AsRawFd::as_raw_fd(&write);
            assert_eq!(wait_writable(wfd, Deadline::Never), Ok(FiberState::Ready));
            use std::io::Write;
            std::fs::File::from(write).write_all(b"x").unwrap();
        })
        .unwrap();
        run().unwrap();

        assert_eq!(*result.borrow(), Some(Ok(FiberState::Ready)));
    }

    #[test]
    fn test_run_blocking_from_facade() {
        let result = Rc::new(RefCell::new(None));
        let r = Rc::clone(&result);
        spawn(move || {
            *r.borrow_mut() = Some(run_blocking(Deadline::Never, || Ok::<_, ()>("done")));
        })
        .unwrap();
        run().unwrap();
        assert_eq!(*result.borrow(), Some(Ok("done")));
    }

    #[test]
    fn test_loop_identity() {
        let here = current_loop();
        assert!(Rc::ptr_eq(&here, &current_loop()));
        assert!(Rc::ptr_eq(&here, &EventLoop::current()));
        let other = std::thread::spawn(|| Rc::as_ptr(&current_loop()) as usize)
            .join()
            .unwrap();
        assert_ne!(Rc::as_ptr(&here) as usize, other);
    }
}
