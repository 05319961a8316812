//! # fiberloop-core
//!
//! Core types for the fiberloop cooperative runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Stacks, context switching, polling and the event loop live in
//! `fiberloop-runtime`.
//!
//! ## Modules
//!
//! - `id` - Fiber identifier type
//! - `state` - Fiber resume states
//! - `deadline` - Absolute deadlines with an infinite variant
//! - `slot` - LIFO free-list of reusable fiber slots
//! - `traits` - The suspend/schedule capability channels are built on
//! - `channel` - Bounded and rendezvous channel
//! - `broadcast` - One-to-many wakeup
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod deadline;
pub mod slot;
pub mod traits;
pub mod channel;
pub mod broadcast;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::FiberId;
pub use state::FiberState;
pub use deadline::Deadline;
pub use slot::SlotCache;
pub use traits::FiberContext;
pub use channel::Channel;
pub use broadcast::Broadcast;
pub use error::{DispatchError, FiberError, FiberResult, MemoryError, WorkerError};
pub use env::{env_get, env_get_bool, env_get_duration_ms, env_get_opt, env_is_set};

/// Layout constants shared by the runtime
pub mod constants {
    /// Guard page size below every fiber stack
    pub const GUARD_SIZE: usize = 4096;

    /// Default usable stack size per fiber (256 KiB)
    pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

    /// Smallest stack the runtime accepts
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Default cap on fibers per scheduler
    pub const DEFAULT_MAX_FIBERS: usize = 65536;

    /// Default cap on the watcher table
    pub const DEFAULT_MAX_DESCRIPTORS: usize = 65536;

    /// Events fetched per poll call
    pub const DEFAULT_POLL_BATCH: usize = 256;
}
