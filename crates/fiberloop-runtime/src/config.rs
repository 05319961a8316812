//! Runtime configuration
//!
//! Library defaults with environment overrides.
//!
//! ```rust,ignore
//! use fiberloop_runtime::RuntimeConfig;
//!
//! // Defaults plus FIBER_* overrides
//! let config = RuntimeConfig::from_env();
//!
//! // Or customize programmatically
//! let config = RuntimeConfig::new()
//!     .stack_size(512 * 1024)
//!     .blocking_workers(4);
//! ```

use fiberloop_core::constants::MIN_STACK_SIZE;
use fiberloop_core::env::{env_get, env_get_bool, env_get_duration_ms};
use std::time::Duration;

pub mod defaults {
    use fiberloop_core::constants;

    pub const STACK_SIZE: usize = constants::DEFAULT_STACK_SIZE;
    pub const MAX_FIBERS: usize = constants::DEFAULT_MAX_FIBERS;
    pub const MAX_DESCRIPTORS: usize = constants::DEFAULT_MAX_DESCRIPTORS;
    pub const POLL_BATCH: usize = constants::DEFAULT_POLL_BATCH;
    pub const POLL_RETRY_LIMIT: u32 = 3;
    pub const BLOCKING_QUEUE_DEPTH: usize = 1024;
    pub const PARK_TIMEOUT_MS: u64 = 10;
    pub const DEBUG_LOGGING: bool = cfg!(feature = "debug-logging");

    /// min(8, nproc/2), at least 2
    pub fn blocking_workers() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus / 2).clamp(2, 8)
    }
}

/// Configuration shared by a thread's scheduler, event loop and the
/// process-wide blocking pool.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Usable stack bytes per fiber (a guard page is added)
    pub stack_size: usize,
    /// Fibers per scheduler, root excluded
    pub max_fibers: usize,
    /// Upper bound on the watcher table; the descriptor rlimit may lower it
    pub max_descriptors: usize,
    /// Events fetched per poll call
    pub poll_batch: usize,
    /// Consecutive poll failures tolerated before `run` gives up
    pub poll_retry_limit: u32,
    /// Threads in the blocking pool
    pub blocking_workers: usize,
    /// Pending jobs the blocking pool accepts
    pub blocking_queue_depth: usize,
    /// Idle worker park timeout
    pub park_timeout: Duration,
    /// Per-cycle loop diagnostics
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `FIBER_STACK_SIZE` - Usable stack bytes per fiber
    /// - `FIBER_MAX_FIBERS` - Fibers per scheduler
    /// - `FIBER_MAX_DESCRIPTORS` - Watcher table cap
    /// - `FIBER_POLL_BATCH` - Events per poll call
    /// - `FIBER_POLL_RETRIES` - Consecutive poll failures tolerated
    /// - `FIBER_BLOCKING_WORKERS` - Blocking pool threads
    /// - `FIBER_BLOCKING_QUEUE` - Blocking pool queue depth
    /// - `FIBER_PARK_TIMEOUT_MS` - Idle worker park timeout
    /// - `FIBER_DEBUG` - Per-cycle loop diagnostics (0/1)
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get("FIBER_STACK_SIZE", defaults::STACK_SIZE),
            max_fibers: env_get("FIBER_MAX_FIBERS", defaults::MAX_FIBERS),
            max_descriptors: env_get("FIBER_MAX_DESCRIPTORS", defaults::MAX_DESCRIPTORS),
            poll_batch: env_get("FIBER_POLL_BATCH", defaults::POLL_BATCH),
            poll_retry_limit: env_get("FIBER_POLL_RETRIES", defaults::POLL_RETRY_LIMIT),
            blocking_workers: env_get("FIBER_BLOCKING_WORKERS", defaults::blocking_workers()),
            blocking_queue_depth: env_get("FIBER_BLOCKING_QUEUE", defaults::BLOCKING_QUEUE_DEPTH),
            park_timeout: env_get_duration_ms("FIBER_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            debug_logging: env_get_bool("FIBER_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Library defaults only, ignoring the environment
    pub fn new() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            max_fibers: defaults::MAX_FIBERS,
            max_descriptors: defaults::MAX_DESCRIPTORS,
            poll_batch: defaults::POLL_BATCH,
            poll_retry_limit: defaults::POLL_RETRY_LIMIT,
            blocking_workers: defaults::blocking_workers(),
            blocking_queue_depth: defaults::BLOCKING_QUEUE_DEPTH,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn max_fibers(mut self, n: usize) -> Self {
        self.max_fibers = n;
        self
    }

    pub fn max_descriptors(mut self, n: usize) -> Self {
        self.max_descriptors = n;
        self
    }

    pub fn poll_batch(mut self, n: usize) -> Self {
        self.poll_batch = n;
        self
    }

    pub fn poll_retry_limit(mut self, n: u32) -> Self {
        self.poll_retry_limit = n;
        self
    }

    pub fn blocking_workers(mut self, n: usize) -> Self {
        self.blocking_workers = n;
        self
    }

    pub fn blocking_queue_depth(mut self, n: usize) -> Self {
        self.blocking_queue_depth = n;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err("stack_size is below the 16 KiB minimum");
        }
        if self.max_fibers == 0 {
            return Err("max_fibers must be at least 1");
        }
        if self.max_descriptors == 0 {
            return Err("max_descriptors must be at least 1");
        }
        if self.poll_batch == 0 {
            return Err("poll_batch must be at least 1");
        }
        if self.blocking_workers == 0 {
            return Err("blocking_workers must be at least 1");
        }
        if self.blocking_queue_depth == 0 {
            return Err("blocking_queue_depth must be at least 1");
        }
        Ok(())
    }
}
