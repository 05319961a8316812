//! One-to-many wakeup
//!
//! Fibers park in [`Broadcast::wait`]; a [`Broadcast::dispatch`] wakes every
//! fiber parked at that moment and hands each of them the value. Fibers
//! that start waiting after a dispatch do not see it.
//!
//! Each dispatch is tagged with a sequence number. A waiter remembers the
//! number of the dispatch it subscribed for, so it consumes its own value
//! even when later dispatches are already queued behind it.

use crate::id::FiberId;
use crate::state::FiberState;
use crate::traits::FiberContext;
use std::cell::RefCell;
use std::collections::VecDeque;

struct Delivery<T> {
    seq: u64,
    value: Option<T>,
    /// Subscribers that have not consumed it yet
    remaining: usize,
}

struct Inner<T> {
    subscribers: Vec<FiberId>,
    deliveries: VecDeque<Delivery<T>>,
    next_seq: u64,
}

pub struct Broadcast<T, C: FiberContext> {
    ctx: C,
    inner: RefCell<Inner<T>>,
}

impl<T: Clone, C: FiberContext + Default> Broadcast<T, C> {
    pub fn new() -> Self {
        Self::with_context(C::default())
    }
}

impl<T: Clone, C: FiberContext + Default> Default for Broadcast<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, C: FiberContext> Broadcast<T, C> {
    pub fn with_context(ctx: C) -> Self {
        Self {
            ctx,
            inner: RefCell::new(Inner {
                subscribers: Vec::new(),
                deliveries: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    /// Park until the next dispatch and return its value
    ///
    /// Returns `None` if the fiber is woken by anything other than a
    /// dispatch (for example the loop shutting down).
    pub fn wait(&self) -> Option<T> {
        let me = self.ctx.running();
        let ticket = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.push(me);
            inner.next_seq
        };

        let state = self.ctx.suspend();

        let mut inner = self.inner.borrow_mut();
        let Some(pos) = inner.deliveries.iter().position(|d| d.seq == ticket) else {
            inner.subscribers.retain(|fiber| *fiber != me);
            return None;
        };
        let value = Self::consume(&mut inner.deliveries, pos);
        if state != FiberState::Ready {
            return None;
        }
        value
    }

    /// Wake all current subscribers with `value`
    ///
    /// Returns false, dropping `value`, when nobody is waiting.
    pub fn dispatch(&self, value: T) -> bool {
        let (subscribers, seq) = {
            let mut inner = self.inner.borrow_mut();
            if inner.subscribers.is_empty() {
                return false;
            }
            let subscribers = std::mem::take(&mut inner.subscribers);
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.deliveries.push_back(Delivery {
                seq,
                value: Some(value),
                remaining: subscribers.len(),
            });
            (subscribers, seq)
        };

        for fiber in subscribers {
            if !self.ctx.schedule(fiber, FiberState::Ready) {
                // That fiber will never come back for its share.
                let mut inner = self.inner.borrow_mut();
                if let Some(pos) = inner.deliveries.iter().position(|d| d.seq == seq) {
                    Self::consume(&mut inner.deliveries, pos);
                }
            }
        }
        true
    }

    /// Number of fibers currently waiting
    pub fn subscribers(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Dispatches not yet consumed by all of their recipients
    pub fn pending(&self) -> usize {
        self.inner.borrow().deliveries.len()
    }

    fn consume(deliveries: &mut VecDeque<Delivery<T>>, pos: usize) -> Option<T> {
        let delivery = &mut deliveries[pos];
        delivery.remaining -= 1;
        if delivery.remaining == 0 {
            deliveries.remove(pos).and_then(|d| d.value)
        } else {
            delivery.value.clone()
        }
    }
}
