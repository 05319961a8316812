//! Blocking work from inside a fiber
//!
//! `run_blocking` ships a closure to the blocking pool and parks the
//! calling fiber on a pipe until the worker is done, so the rest of the
//! loop keeps running meanwhile:
//!
//! ```text
//!   fiber                          worker thread
//!   ─────                          ─────────────
//!   pipe()
//!   wait writable(write end)
//!   submit(job) ─────────────────► run task in a fiber of its own loop
//!   wait readable(read end)        push outcome into the slot
//!        ◄──────────────────────── write 1 byte, close write end
//!   pop outcome
//! ```
//!
//! The job owns the write end, so a caller that gave up (timeout or stop)
//! never has a worker write into a descriptor number it has reused.

use crate::event_loop::EventLoop;
use crate::os;
use crate::poller::Interest;
use crate::tls;
use crate::worker::BlockingPool;

use fiberloop_core::{kdebug, Deadline, DispatchError, FiberError, FiberResult, FiberState};

use crossbeam_queue::ArrayQueue;
use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

type Outcome<T, E> = FiberResult<Result<T, E>>;

impl EventLoop {
    /// Run `task` on the blocking pool and wait for its result.
    ///
    /// `Err(Task(e))` carries the task's own error. `Err(Runtime(_))` is
    /// `Timeout` when `deadline` passes first, `Canceled` when the loop
    /// stops first, `TaskPanicked` when the task panics, or a setup error.
    pub fn run_blocking<T, E, F>(&self, deadline: Deadline, task: F) -> Result<T, DispatchError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (read, write) = os::pipe()?;
        self.wait_ready(write.as_raw_fd(), Interest::Write, deadline)?;

        let slot: Arc<ArrayQueue<Outcome<T, E>>> = Arc::new(ArrayQueue::new(1));
        let outcome = Arc::clone(&slot);
        BlockingPool::global()?.submit(move || {
            let _ = outcome.push(execute(task));
            if let Err(e) = File::from(write).write_all(&[1]) {
                // Reader already gone
                kdebug!("blocking job completion not delivered: {}", e);
            }
        })?;

        self.wait_ready(read.as_raw_fd(), Interest::Read, deadline)?;
        match slot.pop() {
            Some(Ok(Ok(value))) => Ok(value),
            Some(Ok(Err(e))) => Err(DispatchError::Task(e)),
            Some(Err(e)) => Err(DispatchError::Runtime(e)),
            None => Err(DispatchError::Runtime(FiberError::Canceled)),
        }
    }

    fn wait_ready(&self, fd: RawFd, interest: Interest, deadline: Deadline) -> FiberResult<()> {
        match self.wait_io(fd, interest, deadline)? {
            FiberState::Ready => Ok(()),
            _ => Err(FiberError::Canceled),
        }
    }
}

/// Worker side: run `task` in a fiber on this thread's loop
fn execute<T, E, F>(task: F) -> Outcome<T, E>
where
    F: FnOnce() -> Result<T, E> + 'static,
    T: 'static,
    E: 'static,
{
    let lp = tls::try_current_loop()?;
    let result = Rc::new(RefCell::new(None));

    let out = Rc::clone(&result);
    lp.spawn(move || {
        *out.borrow_mut() = Some(panic::catch_unwind(AssertUnwindSafe(task)));
    })?;
    lp.run()?;

    let result = result.borrow_mut().take();
    match result {
        Some(Ok(value)) => Ok(value),
        Some(Err(_)) => Err(FiberError::TaskPanicked),
        None => Err(FiberError::Canceled),
    }
}
