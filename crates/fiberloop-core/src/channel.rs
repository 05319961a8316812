//! Bounded and rendezvous channel for fibers on one scheduler
//!
//! A `Channel` never crosses threads: all parties are fibers of the scheduler
//! behind its [`FiberContext`]. Blocking is done by suspending the calling
//! fiber; wakeups go through `schedule`.
//!
//! Capacity 0 is a rendezvous: a write completes only once a reader has
//! taken the value.
//!
//! ```ignore
//! let ch = Rc::new(Channel::new(0));
//! let rx = ch.clone();
//! spawn(move || assert_eq!(rx.read(), Some(42)));
//! spawn(move || assert!(ch.write(42)));
//! ```

use crate::id::FiberId;
use crate::state::FiberState;
use crate::traits::FiberContext;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

struct Inner<T> {
    /// Values written with no reader waiting; may exceed capacity by the
    /// values of writers that are blocked
    buffer: VecDeque<T>,
    /// Values handed directly to readers that are scheduled but not yet
    /// resumed, keyed by the reader they belong to
    handoff: VecDeque<(FiberId, T)>,
    readers: VecDeque<FiberId>,
    writers: VecDeque<FiberId>,
    closed: bool,
}

pub struct Channel<T, C: FiberContext> {
    ctx: C,
    capacity: usize,
    inner: RefCell<Inner<T>>,
}

impl<T, C: FiberContext + Default> Channel<T, C> {
    /// Channel bound to the default context (the current thread's scheduler)
    pub fn new(capacity: usize) -> Self {
        Self::with_context(C::default(), capacity)
    }
}

impl<T, C: FiberContext> Channel<T, C> {
    pub fn with_context(ctx: C, capacity: usize) -> Self {
        Self {
            ctx,
            capacity,
            inner: RefCell::new(Inner {
                buffer: VecDeque::with_capacity(capacity),
                handoff: VecDeque::new(),
                readers: VecDeque::new(),
                writers: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Send `value`, blocking while the buffer is over capacity
    ///
    /// Returns false if the channel is closed, or if the writer was blocked
    /// and then woken by `close` instead of a reader. A value accepted
    /// before such a close is dropped with the buffer.
    pub fn write(&self, value: T) -> bool {
        let me = self.ctx.running();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return false;
            }

            match inner.readers.pop_front() {
                Some(reader) => {
                    inner.handoff.push_back((reader, value));
                    self.ctx.schedule(reader, FiberState::Ready);
                }
                None => inner.buffer.push_back(value),
            }

            if inner.buffer.len() <= self.capacity {
                return true;
            }
            inner.writers.push_back(me);
        }

        if self.ctx.suspend() == FiberState::Ready {
            return true;
        }
        self.inner.borrow_mut().writers.retain(|writer| *writer != me);
        false
    }

    /// Receive the oldest value, blocking while none is available
    ///
    /// Returns `None` once the channel is closed. A value a writer already
    /// handed to this reader is returned even if the wake was canceled.
    pub fn read(&self) -> Option<T> {
        let me = self.ctx.running();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return None;
            }

            if let Some(writer) = inner.writers.pop_front() {
                self.ctx.schedule(writer, FiberState::Ready);
            }

            if let Some(value) = inner.buffer.pop_front() {
                return Some(value);
            }
            inner.readers.push_back(me);
        }

        let state = self.ctx.suspend();

        let mut inner = self.inner.borrow_mut();
        if let Some(pos) = inner.handoff.iter().position(|(reader, _)| *reader == me) {
            return inner.handoff.remove(pos).map(|(_, value)| value);
        }
        if state != FiberState::Ready {
            inner.readers.retain(|reader| *reader != me);
        }
        None
    }

    /// Close the channel and wake every blocked party as canceled
    ///
    /// Idempotent. Values already handed to a scheduled reader still reach it.
    pub fn close(&self) {
        let (readers, writers) = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.buffer.clear();
            (
                std::mem::take(&mut inner.readers),
                std::mem::take(&mut inner.writers),
            )
        };

        for fiber in readers.into_iter().chain(writers) {
            self.ctx.schedule(fiber, FiberState::Canceled);
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffered values
    pub fn len(&self) -> usize {
        self.inner.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().buffer.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Whether `read` would return without blocking
    pub fn can_read(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.closed && (!inner.buffer.is_empty() || !inner.writers.is_empty())
    }

    /// Whether `write` would return without blocking
    pub fn can_write(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.closed && (!inner.readers.is_empty() || inner.buffer.len() < self.capacity)
    }

    pub fn has_readers(&self) -> bool {
        !self.inner.borrow().readers.is_empty()
    }

    pub fn has_writers(&self) -> bool {
        !self.inner.borrow().writers.is_empty()
    }
}

impl<T, C: FiberContext> Drop for Channel<T, C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T, C: FiberContext> fmt::Debug for Channel<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Channel")
            .field("capacity", &self.capacity)
            .field("buffered", &inner.buffer.len())
            .field("readers", &inner.readers.len())
            .field("writers", &inner.writers.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::script::Script;
    use std::rc::Rc;

    fn channel(script: &Rc<Script>, capacity: usize) -> Channel<i32, Rc<Script>> {
        Channel::with_context(script.clone(), capacity)
    }

    #[test]
    fn test_buffered_fifo_without_blocking() {
        let script = Script::new(1);
        let ch = channel(&script, 2);

        assert!(ch.write(1));
        assert!(ch.write(2));
        assert!(!ch.can_write());
        assert_eq!(ch.len(), 2);

        assert_eq!(ch.read(), Some(1));
        assert_eq!(ch.read(), Some(2));
        assert!(ch.is_empty());
        assert_eq!(script.suspends.get(), 0);
    }

    #[test]
    fn test_write_over_capacity_blocks_until_read() {
        let script = Script::new(3);
        let ch = channel(&script, 0);

        script.answer(FiberState::Ready);
        assert!(ch.write(7));
        assert_eq!(script.suspends.get(), 1);
        assert!(ch.has_writers());
        assert!(ch.can_read());

        script.running.set(4);
        assert_eq!(ch.read(), Some(7));
        assert_eq!(script.take_scheduled(), vec![(FiberId::new(3), FiberState::Ready)]);
        assert!(!ch.has_writers());
    }

    #[test]
    fn test_write_hands_off_to_waiting_reader() {
        let script = Script::new(5);
        let ch = Rc::new(channel(&script, 0));

        let writer = ch.clone();
        let hook_script = script.clone();
        script.on_suspend(move || {
            assert!(writer.has_readers());
            assert!(writer.can_write());
            hook_script.running.set(6);
            assert!(writer.write(9));
            assert!(writer.is_empty());
            assert!(!writer.has_readers());
        });
        script.answer(FiberState::Ready);

        assert_eq!(ch.read(), Some(9));
        assert_eq!(script.take_scheduled(), vec![(FiberId::new(5), FiberState::Ready)]);
    }

    #[test]
    fn test_handoff_survives_canceled_wake() {
        let script = Script::new(1);
        let ch = Rc::new(channel(&script, 0));

        // Reader 1 is handed 1, but its wake is turned into a cancel
        let writer = ch.clone();
        let hook_script = script.clone();
        script.on_suspend(move || {
            hook_script.running.set(2);
            assert!(writer.write(1));
        });
        script.answer(FiberState::Canceled);
        assert_eq!(ch.read(), Some(1));

        // Reader 3 gets exactly what is written to it next
        script.running.set(3);
        let writer = ch.clone();
        let hook_script = script.clone();
        script.on_suspend(move || {
            hook_script.running.set(2);
            assert!(writer.write(2));
        });
        script.answer(FiberState::Ready);
        assert_eq!(ch.read(), Some(2));

        assert_eq!(
            script.take_scheduled(),
            vec![
                (FiberId::new(1), FiberState::Ready),
                (FiberId::new(3), FiberState::Ready),
            ]
        );
        assert!(!ch.has_readers());
        assert!(ch.is_empty());
    }

    #[test]
    fn test_canceled_reader_unregisters() {
        let script = Script::new(4);
        let ch = channel(&script, 0);

        script.answer(FiberState::Canceled);
        assert_eq!(ch.read(), None);
        assert!(!ch.has_readers());
        assert!(!ch.can_write());
    }

    #[test]
    fn test_rendezvous_read_receives_handoff() {
        let script = Script::new(1);
        let ch = Rc::new(channel(&script, 0));

        let writer = ch.clone();
        let hook_script = script.clone();
        script.on_suspend(move || {
            hook_script.running.set(2);
            assert!(writer.write(42));
        });
        script.answer(FiberState::Ready);

        assert_eq!(ch.read(), Some(42));
        assert_eq!(script.take_scheduled(), vec![(FiberId::new(1), FiberState::Ready)]);
        assert!(!ch.has_readers());
    }

    #[test]
    fn test_close_cancels_blocked_parties() {
        let script = Script::new(1);
        let ch = Rc::new(channel(&script, 0));

        let closer = ch.clone();
        script.on_suspend(move || closer.close());
        script.answer(FiberState::Canceled);
        assert_eq!(ch.read(), None);
        assert_eq!(script.take_scheduled(), vec![(FiberId::new(1), FiberState::Canceled)]);
        assert!(ch.is_closed());
        assert!(!ch.write(1));
        assert_eq!(ch.read(), None);
        assert!(!ch.can_read());
        assert!(!ch.can_write());
        assert!(!ch.has_readers());

        ch.close();
        assert!(script.take_scheduled().is_empty());
    }

    #[test]
    fn test_close_drops_buffer() {
        let script = Script::new(1);
        let ch = channel(&script, 4);
        assert!(ch.write(1));
        assert!(ch.write(2));
        ch.close();
        assert_eq!(ch.len(), 0);
        assert_eq!(ch.read(), None);
    }
}
