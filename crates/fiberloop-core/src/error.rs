//! Error types for the fiberloop runtime

use core::fmt;

/// Result type for runtime operations
pub type FiberResult<T> = Result<T, FiberError>;

/// Errors surfaced by blocking calls and runtime setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiberError {
    /// The loop shut down while the operation was pending
    Canceled,

    /// An I/O wait's deadline elapsed before readiness
    Timeout,

    /// Another fiber already waits on this (descriptor, direction)
    AlreadyInUse,

    /// Descriptor is negative or beyond the watcher table
    InvalidDescriptor(i32),

    /// Fiber arena is full
    NoSlotsAvailable,

    /// A blocking task panicked on its worker thread
    TaskPanicked,

    /// Stack mapping failed
    Memory(MemoryError),

    /// Blocking pool failure
    Worker(WorkerError),

    /// Runtime configuration rejected at loop construction
    Config(&'static str),

    /// Raw errno from a syscall
    Os(i32),
}

impl FiberError {
    /// Capture errno of the last failed syscall
    pub fn last_os_error() -> Self {
        FiberError::Os(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }

    /// errno carried by this error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            FiberError::Os(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for FiberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberError::Canceled => write!(f, "operation canceled"),
            FiberError::Timeout => write!(f, "operation timed out"),
            FiberError::AlreadyInUse => write!(f, "descriptor already in use"),
            FiberError::InvalidDescriptor(fd) => write!(f, "invalid descriptor {}", fd),
            FiberError::NoSlotsAvailable => write!(f, "no fiber slots available"),
            FiberError::TaskPanicked => write!(f, "blocking task panicked"),
            FiberError::Memory(e) => write!(f, "memory error: {}", e),
            FiberError::Worker(e) => write!(f, "worker error: {}", e),
            FiberError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            FiberError::Os(code) => {
                write!(f, "os error: {}", std::io::Error::from_raw_os_error(*code))
            }
        }
    }
}

impl std::error::Error for FiberError {}

impl From<std::io::Error> for FiberError {
    fn from(e: std::io::Error) -> Self {
        match e.raw_os_error() {
            Some(code) => FiberError::Os(code),
            None => FiberError::Os(0),
        }
    }
}

/// Stack mapping errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,

    /// Requested stack size is zero or overflows
    InvalidSize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "stack protection change failed"),
            MemoryError::InvalidSize => write!(f, "invalid stack size"),
        }
    }
}

impl From<MemoryError> for FiberError {
    fn from(e: MemoryError) -> Self {
        FiberError::Memory(e)
    }
}

/// Blocking pool errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn a worker thread
    SpawnFailed,

    /// Job queue is at capacity
    QueueFull,

    /// Pool is shutting down
    ShutDown,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn worker thread"),
            WorkerError::QueueFull => write!(f, "blocking queue full"),
            WorkerError::ShutDown => write!(f, "blocking pool shut down"),
        }
    }
}

impl From<WorkerError> for FiberError {
    fn from(e: WorkerError) -> Self {
        FiberError::Worker(e)
    }
}

/// Failure of a task run on the blocking pool
///
/// `Task` carries the task's own error unchanged; `Runtime` means the task
/// never produced a result the caller can use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError<E> {
    Task(E),
    Runtime(FiberError),
}

impl<E> DispatchError<E> {
    /// The runtime error, if this is not a task error
    pub fn runtime(&self) -> Option<&FiberError> {
        match self {
            DispatchError::Runtime(e) => Some(e),
            DispatchError::Task(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for DispatchError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Task(e) => write!(f, "task failed: {}", e),
            DispatchError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for DispatchError<E> {}

impl<E> From<FiberError> for DispatchError<E> {
    fn from(e: FiberError) -> Self {
        DispatchError::Runtime(e)
    }
}
