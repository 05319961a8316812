//! Binds the core primitives to the thread's scheduler

use crate::scheduler::Scheduler;
use crate::tls::current_loop;
use fiberloop_core::{FiberContext, FiberId, FiberState};
use std::rc::Rc;

/// Scheduler handle captured by channels and broadcasts.
/// `Handle::default()` is the current thread's loop scheduler.
#[derive(Clone)]
pub struct Handle(Rc<Scheduler>);

impl Handle {
    pub fn new(scheduler: Rc<Scheduler>) -> Self {
        Self(scheduler)
    }

    #[inline]
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self(Rc::clone(current_loop().scheduler()))
    }
}

impl FiberContext for Handle {
    #[inline]
    fn running(&self) -> FiberId {
        self.0.running()
    }

    #[inline]
    fn suspend(&self) -> FiberState {
        self.0.suspend()
    }

    #[inline]
    fn schedule(&self, fiber: FiberId, state: FiberState) -> bool {
        self.0.schedule(fiber, state)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handle").field(&self.0.running()).finish()
    }
}

/// Channel on the current thread's scheduler
pub type Channel<T> = fiberloop_core::Channel<T, Handle>;

/// Broadcast on the current thread's scheduler
pub type Broadcast<T> = fiberloop_core::Broadcast<T, Handle>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn spawn(task: impl FnOnce() + 'static) {
        current_loop().spawn(task).unwrap();
    }

    fn spawn_writer(ch: &Rc<Channel<i32>>, log: &Log, values: Vec<i32>) {
        let (ch, log) = (Rc::clone(ch), Rc::clone(log));
        spawn(move || {
            for v in values {
                assert!(ch.write(v));
                log.borrow_mut().push(format!("w{v}"));
            }
        });
    }

    fn spawn_reader(ch: &Rc<Channel<i32>>, log: &Log, count: usize) {
        let (ch, log) = (Rc::clone(ch), Rc::clone(log));
        spawn(move || {
            for _ in 0..count {
                let v = ch.read().unwrap();
                log.borrow_mut().push(format!("r{v}"));
            }
        });
    }

    #[test]
    fn test_rendezvous_channel() {
        let ch = Rc::new(Channel::new(0));
        let log = log();

        spawn_writer(&ch, &log, vec![0, 1]);
        assert!(ch.has_writers());
        assert!(ch.can_read());
        spawn_reader(&ch, &log, 2);
        assert!(ch.has_readers());

        current_loop().run().unwrap();
        assert_eq!(*log.borrow(), vec!["r0", "w0", "w1", "r1"]);
        assert!(!ch.has_readers());
        assert!(!ch.has_writers());
    }

    #[test]
    fn test_buffered_channel() {
        let ch = Rc::new(Channel::new(1));
        let log = log();

        spawn_writer(&ch, &log, vec![0, 1, 2]);
        assert_eq!(ch.len(), 2);
        spawn_reader(&ch, &log, 3);

        current_loop().run().unwrap();
        assert_eq!(*log.borrow(), vec!["w0", "r0", "r1", "w1", "w2", "r2"]);
        assert!(ch.is_empty());
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let ch = Rc::new(Channel::<i32>::new(1));
        let got = Rc::new(Cell::new(Some(-1)));

        let (c, g) = (Rc::clone(&ch), Rc::clone(&got));
        spawn(move || g.set(c.read()));
        assert!(ch.has_readers());
        assert!(ch.can_write());

        ch.close();
        current_loop().run().unwrap();
        assert_eq!(got.get(), None);
        assert!(!ch.has_readers());
        assert!(!ch.can_write());
        assert!(!ch.write(5));
    }

    #[test]
    fn test_close_wakes_blocked_writer() {
        let ch = Rc::new(Channel::new(0));
        let accepted = Rc::new(Cell::new(None));

        let (c, a) = (Rc::clone(&ch), Rc::clone(&accepted));
        spawn(move || a.set(Some(c.write(7))));
        assert!(ch.has_writers());

        ch.close();
        current_loop().run().unwrap();
        assert_eq!(accepted.get(), Some(false));
        assert!(ch.is_closed());
        assert_eq!(ch.read(), None);
    }

    #[test]
    fn test_handoff_reaches_reader_across_stop() {
        let ch = Rc::new(Channel::<i32>::new(0));
        let got = Rc::new(RefCell::new(Vec::new()));

        for (round, value) in [(0, 1), (1, 2)] {
            let (c, g) = (Rc::clone(&ch), Rc::clone(&got));
            spawn(move || {
                let value = c.read();
                g.borrow_mut().push((round, value));
            });

            let c = Rc::clone(&ch);
            spawn(move || {
                assert!(c.write(value));
                // The reader's wake is already queued; stopping turns it
                // into a cancel
                current_loop().stop();
            });
            current_loop().run().unwrap();
        }

        assert_eq!(*got.borrow(), vec![(0, Some(1)), (1, Some(2))]);
        assert!(ch.is_empty());
        assert!(!ch.can_read());
    }

    #[test]
    fn test_close_without_parties() {
        let ch = Channel::<i32>::new(2);
        assert!(ch.write(1));
        ch.close();
        ch.close();
        assert!(ch.is_empty());
        assert!(!ch.can_read());
        assert_eq!(ch.read(), None);
    }

    #[test]
    fn test_broadcast_reaches_every_waiter() {
        let bc = Rc::new(Broadcast::<i32>::new());
        let got = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..2 {
            let (b, g) = (Rc::clone(&bc), Rc::clone(&got));
            spawn(move || {
                let value = b.wait();
                g.borrow_mut().push(value);
            });
        }
        assert_eq!(bc.subscribers(), 2);

        assert!(bc.dispatch(42));
        assert_eq!(bc.subscribers(), 0);
        current_loop().run().unwrap();

        assert_eq!(*got.borrow(), vec![Some(42), Some(42)]);
        assert_eq!(bc.pending(), 0);
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let bc = Rc::new(Broadcast::<i32>::new());
        let got = Rc::new(RefCell::new(Vec::new()));
        assert!(!bc.dispatch(1));
        assert_eq!(bc.pending(), 0);

        // A late waiter only sees dispatches made after it subscribed
        let (b, g) = (Rc::clone(&bc), Rc::clone(&got));
        spawn(move || {
            let value = b.wait();
            g.borrow_mut().push(value);
        });
        assert!(got.borrow().is_empty());
        assert!(bc.dispatch(2));

        current_loop().run().unwrap();
        assert_eq!(*got.borrow(), vec![Some(2)]);
        assert_eq!(bc.pending(), 0);
    }

    #[test]
    fn test_broadcast_waiters_keep_their_own_delivery() {
        let bc = Rc::new(Broadcast::<&'static str>::new());
        let got = Rc::new(RefCell::new(Vec::new()));

        let (b, g) = (Rc::clone(&bc), Rc::clone(&got));
        spawn(move || {
            let value = b.wait();
            g.borrow_mut().push(value);
        });
        assert!(bc.dispatch("first"));

        let (b, g) = (Rc::clone(&bc), Rc::clone(&got));
        spawn(move || {
            let value = b.wait();
            g.borrow_mut().push(value);
        });
        assert!(bc.dispatch("second"));

        current_loop().run().unwrap();
        assert_eq!(*got.borrow(), vec![Some("first"), Some("second")]);
    }
}
