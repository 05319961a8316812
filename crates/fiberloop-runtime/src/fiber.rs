//! Per-fiber record kept in the scheduler arena

use crate::arch::Context;
use crate::memory::Stack;
use fiberloop_core::{Deadline, FiberId, FiberState};

/// Intrusive link into the loop's sleep queue
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SleepLink {
    pub prev: Option<FiberId>,
    pub next: Option<FiberId>,
    pub linked: bool,
}

pub struct Fiber {
    pub(crate) id: FiberId,
    pub(crate) state: FiberState,
    /// Sitting in the ready queue
    pub(crate) queued: bool,
    /// None for root, which runs on the thread's own stack
    pub(crate) stack: Option<Stack>,
    pub(crate) context: Context,
    pub(crate) task: Option<Box<dyn FnOnce()>>,
    /// Where control goes when this fiber parks
    pub(crate) caller: Option<FiberId>,
    pub(crate) deadline: Deadline,
    pub(crate) sleep: SleepLink,
}

impl Fiber {
    pub(crate) fn root() -> Self {
        Self::with_stack(FiberId::ROOT, None)
    }

    pub(crate) fn new(id: FiberId, stack: Stack) -> Self {
        Self::with_stack(id, Some(stack))
    }

    fn with_stack(id: FiberId, stack: Option<Stack>) -> Self {
        Self {
            id,
            state: FiberState::Created,
            queued: false,
            stack,
            context: Context::default(),
            task: None,
            caller: None,
            deadline: Deadline::Never,
            sleep: SleepLink::default(),
        }
    }

    /// Install the next task on a new or cached fiber
    pub(crate) fn arm(&mut self, task: Box<dyn FnOnce()>, caller: FiberId) {
        self.state = FiberState::Created;
        self.task = Some(task);
        self.caller = Some(caller);
        self.deadline = Deadline::Never;
    }

    #[inline]
    pub fn id(&self) -> FiberId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> FiberState {
        self.state
    }

    #[inline]
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.sleep.linked
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("queued", &self.queued)
            .field("caller", &self.caller)
            .field("deadline", &self.deadline)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}
