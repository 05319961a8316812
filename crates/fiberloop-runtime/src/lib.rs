//! # fiberloop-runtime
//!
//! Platform part of the fiberloop runtime.
//!
//! This crate provides:
//! - Fiber stacks (mmap with a guard page)
//! - Context switching (architecture-specific assembly)
//! - The per-thread scheduler and its ready chain
//! - Readiness polling (epoll on Linux, kqueue on macOS and the BSDs)
//! - The event loop: descriptor watchers and deadline-ordered sleepers
//! - A blocking pool and the `run_blocking` bridge into it

pub mod arch;
pub mod config;
pub mod dispatch;
pub mod event_loop;
pub mod fiber;
pub mod handle;
pub mod memory;
pub mod os;
pub mod parking;
pub mod poller;
pub mod scheduler;
pub mod timer;
pub mod tls;
pub mod worker;

// Re-exports
pub use config::RuntimeConfig;
pub use event_loop::EventLoop;
pub use handle::{Broadcast, Channel, Handle};
pub use poller::{Event, Interest, Poller};
pub use scheduler::Scheduler;
pub use tls::{current_loop, init_loop, try_current_loop};
pub use worker::BlockingPool;
