//! Per-thread event loop
//!
//! Couples the scheduler with readiness polling and deadlines. Each
//! iteration polls once, wakes the fibers whose descriptors became ready
//! or whose deadlines passed, and runs them as one ready chain.
//!
//! ```text
//!   ┌──────────── run_until ────────────┐
//!   │  poll(min(first sleeper, limit))  │
//!   │  watchers ──► schedule(Ready)     │
//!   │  sleepers ──► schedule(Expired)   │
//!   │  run_ready_chain                  │
//!   └───────────────────────────────────┘
//! ```
//!
//! Leaving `run_until` wakes every queued fiber and every sleeper with
//! `Canceled` and runs them once more, so blocked fibers get a chance to
//! unwind before the loop goes idle.

use crate::config::RuntimeConfig;
use crate::os;
use crate::poller::{Event, Interest, PlatformPoller, Poller};
use crate::scheduler::Scheduler;
use crate::timer::SleepQueue;

use fiberloop_core::{kdebug, kerror, kfatal, kwarn};
use fiberloop_core::{Deadline, FiberError, FiberId, FiberResult, FiberState};

use std::cell::{Cell, RefCell};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Instant;

/// Fibers blocked on one descriptor
#[derive(Debug, Default, Clone, Copy)]
struct Watchers {
    read: Option<FiberId>,
    write: Option<FiberId>,
}

impl Watchers {
    fn slot(&mut self, interest: Interest) -> &mut Option<FiberId> {
        match interest {
            Interest::Read => &mut self.read,
            Interest::Write => &mut self.write,
        }
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

pub struct EventLoop {
    scheduler: Rc<Scheduler>,
    poller: RefCell<Box<dyn Poller>>,
    /// Indexed by descriptor
    watchers: RefCell<Box<[Watchers]>>,
    sleepers: RefCell<SleepQueue>,
    events: RefCell<Vec<Event>>,
    expired: RefCell<Vec<FiberId>>,
    now: Cell<Instant>,
    canceled: Cell<bool>,
    running: Cell<bool>,
    main: bool,
    config: RuntimeConfig,
}

impl EventLoop {
    pub fn new(config: RuntimeConfig) -> FiberResult<Self> {
        config.validate().map_err(FiberError::Config)?;
        let poller = PlatformPoller::new(config.poll_batch)?;
        Self::with_poller(config, Box::new(poller))
    }

    /// Loop driven by a caller-supplied readiness backend
    pub fn with_poller(config: RuntimeConfig, poller: Box<dyn Poller>) -> FiberResult<Self> {
        config.validate().map_err(FiberError::Config)?;

        let table = os::descriptor_limit()?.min(config.max_descriptors);
        let main = std::thread::current().name() == Some("main");
        kdebug!(
            "event loop up: {} descriptors, batch {}{}",
            table,
            config.poll_batch,
            if main { ", main thread" } else { "" }
        );

        Ok(Self {
            scheduler: Scheduler::new(&config),
            poller: RefCell::new(poller),
            watchers: RefCell::new(vec![Watchers::default(); table].into_boxed_slice()),
            sleepers: RefCell::new(SleepQueue::new()),
            events: RefCell::new(Vec::with_capacity(config.poll_batch)),
            expired: RefCell::new(Vec::new()),
            now: Cell::new(Instant::now()),
            canceled: Cell::new(false),
            running: Cell::new(false),
            main,
            config,
        })
    }

    /// This thread's loop
    pub fn current() -> Rc<EventLoop> {
        crate::tls::current_loop()
    }

    #[inline]
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Whether this loop was created on the process's main thread
    #[inline]
    pub fn is_main(&self) -> bool {
        self.main
    }

    /// Clock sampled once per iteration. Outside `run` it is refreshed
    /// on every call.
    pub fn now(&self) -> Instant {
        if !self.running.get() {
            self.refresh_now();
        }
        self.now.get()
    }

    fn refresh_now(&self) {
        self.now.set(Instant::now());
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.canceled.get()
    }

    /// Ask a running loop to finish its current iteration and shut down
    pub fn stop(&self) {
        self.canceled.set(true);
    }

    pub fn spawn<F>(&self, task: F) -> FiberResult<FiberId>
    where
        F: FnOnce() + 'static,
    {
        self.scheduler.spawn(task)
    }

    #[inline]
    pub fn yield_now(&self) -> FiberState {
        self.scheduler.yield_now()
    }

    /// Sleep until `deadline` or an explicit wake. Returns `Expired` on
    /// timeout, `Canceled` on shutdown.
    pub fn wait(&self, deadline: Deadline) -> FiberState {
        let id = self.scheduler.running();
        if id.is_root() {
            kfatal!("wait called outside a fiber");
        }
        self.sleep_insert(id, deadline);
        let state = self.scheduler.suspend();
        self.sleep_remove(id);
        state
    }

    /// Block the running fiber until `fd` is ready for `interest`.
    ///
    /// `Ok(Ready)` on readiness, `Ok(Canceled)` on shutdown or an explicit
    /// cancel, `Err(Timeout)` once `deadline` passes.
    pub fn wait_io(
        &self,
        fd: RawFd,
        interest: Interest,
        deadline: Deadline,
    ) -> FiberResult<FiberState> {
        let index = usize::try_from(fd)
            .ok()
            .filter(|&i| i < self.watchers.borrow().len())
            .ok_or(FiberError::InvalidDescriptor(fd))?;
        let id = self.scheduler.running();
        if id.is_root() {
            kfatal!("wait_io called outside a fiber");
        }

        {
            let mut watchers = self.watchers.borrow_mut();
            let slot = watchers[index].slot(interest);
            if slot.is_some() {
                return Err(FiberError::AlreadyInUse);
            }
            *slot = Some(id);
        }
        if let Err(e) = self.poller.borrow_mut().add(fd, interest) {
            *self.watchers.borrow_mut()[index].slot(interest) = None;
            return Err(e);
        }
        self.sleep_insert(id, deadline);

        let state = self.scheduler.suspend();

        self.sleep_remove(id);
        *self.watchers.borrow_mut()[index].slot(interest) = None;
        if let Err(e) = self.poller.borrow_mut().remove(fd, interest) {
            kwarn!("descriptor {} {:?}: deregistration failed: {}", fd, interest, e);
        }

        match state {
            FiberState::Expired => Err(FiberError::Timeout),
            state => Ok(state),
        }
    }

    pub fn run(&self) -> FiberResult<()> {
        self.run_until(Deadline::Never)
    }

    /// Drive fibers until `deadline`, `stop`, or nothing is left to run.
    /// A nested call returns at once.
    pub fn run_until(&self, deadline: Deadline) -> FiberResult<()> {
        if self.running.get() {
            return Ok(());
        }
        if !self.scheduler.is_root() {
            kwarn!("run called from fiber {} of an idle loop", self.scheduler.running());
            return Ok(());
        }
        self.running.set(true);
        let _guard = RunGuard(self);

        self.refresh_now();
        let result = self.cycle(deadline);
        self.shutdown();
        result
    }

    fn cycle(&self, deadline: Deadline) -> FiberResult<()> {
        let retry_limit = self.config.poll_retry_limit.max(1);
        let mut failures = 0;

        loop {
            if self.canceled.get() || deadline.is_elapsed(self.now.get()) {
                return Ok(());
            }
            let has_ready = self.scheduler.has_ready();
            if !has_ready && self.sleepers.borrow().is_empty() {
                kdebug!("no fiber to schedule, shutting down");
                return Ok(());
            }

            let poll_deadline = if has_ready {
                Deadline::At(self.now.get())
            } else {
                self.first_deadline().min(deadline)
            };

            let polled = {
                let mut events = self.events.borrow_mut();
                self.poller.borrow_mut().poll(poll_deadline, &mut events)
            };
            self.refresh_now();

            match polled {
                Ok(count) => {
                    failures = 0;
                    if self.config.debug_logging {
                        kdebug!(
                            "poll: {} events, {} sleepers, {} ready",
                            count,
                            self.sleepers.borrow().len(),
                            self.scheduler.ready_count()
                        );
                    }
                }
                Err(e) => {
                    failures += 1;
                    kerror!("poll failed ({}/{}): {}", failures, retry_limit, e);
                    if failures >= retry_limit {
                        return Err(e);
                    }
                    continue;
                }
            }

            if self.canceled.get() {
                return Ok(());
            }
            self.schedule_ready();
            self.schedule_expired();
            self.scheduler.run_ready_chain();
        }
    }

    fn schedule_ready(&self) {
        let events = self.events.borrow();
        for event in events.iter() {
            let watchers = usize::try_from(event.fd)
                .ok()
                .and_then(|i| self.watchers.borrow().get(i).copied())
                .unwrap_or_default();

            if watchers.is_empty() {
                if event.error {
                    kerror!("error on unwatched descriptor {}", event.fd);
                    continue;
                }
                kfatal!("defunct descriptor {}", event.fd);
            }
            if event.readable || event.error {
                if let Some(reader) = watchers.read {
                    self.scheduler.schedule(reader, FiberState::Ready);
                }
            }
            if event.writable || event.error {
                if let Some(writer) = watchers.write {
                    self.scheduler.schedule(writer, FiberState::Ready);
                }
            }
        }
    }

    fn schedule_expired(&self) {
        let mut expired = self.expired.borrow_mut();
        let now = self.now.get();
        self.scheduler
            .with_fibers(|fibers| self.sleepers.borrow().collect_expired(fibers, now, &mut expired));
        for id in expired.drain(..) {
            self.scheduler.schedule(id, FiberState::Expired);
        }
    }

    /// Wake everything still pending with `Canceled` and run it once
    fn shutdown(&self) {
        self.scheduler.cancel_ready();
        let mut sleepers = self.expired.borrow_mut();
        self.scheduler
            .with_fibers(|fibers| self.sleepers.borrow().collect_all(fibers, &mut sleepers));
        for id in sleepers.drain(..) {
            self.scheduler.schedule(id, FiberState::Canceled);
        }
        drop(sleepers);
        self.scheduler.run_ready_chain();
    }

    fn first_deadline(&self) -> Deadline {
        self.scheduler
            .with_fibers(|fibers| self.sleepers.borrow().first_deadline(fibers))
    }

    fn sleep_insert(&self, id: FiberId, deadline: Deadline) {
        self.scheduler
            .with_fibers(|fibers| self.sleepers.borrow_mut().insert(fibers, id, deadline));
    }

    fn sleep_remove(&self, id: FiberId) {
        self.scheduler
            .with_fibers(|fibers| self.sleepers.borrow_mut().remove(fibers, id));
    }
}

/// Clears the loop flags however `run_until` exits
struct RunGuard<'a>(&'a EventLoop);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.canceled.set(false);
        self.0.running.set(false);
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("scheduler", &self.scheduler)
            .field("descriptors", &self.watchers.borrow().len())
            .field("sleepers", &self.sleepers.borrow().len())
            .field("running", &self.running.get())
            .field("canceled", &self.canceled.get())
            .field("main", &self.main)
            .finish()
    }
}
