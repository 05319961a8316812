//! Fiber identifier type

use core::fmt;

/// Index of a fiber inside its scheduler's arena
///
/// Slot 0 is reserved for the root fiber, the context the scheduler runs
/// on when no user fiber is executing. User fibers start at 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FiberId(u32);

impl FiberId {
    /// The scheduler's own context
    pub const ROOT: FiberId = FiberId(0);

    /// Create a new FiberId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        FiberId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for FiberId {
    #[inline]
    fn from(id: u32) -> Self {
        FiberId(id)
    }
}

impl From<FiberId> for u32 {
    #[inline]
    fn from(id: FiberId) -> Self {
        id.0
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "FiberId(ROOT)")
        } else {
            write!(f, "FiberId({})", self.0)
        }
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiber_id_basics() {
        let id = FiberId::new(42);
        assert_eq!(id.as_u32(), 42);
        assert_eq!(id.as_usize(), 42);
        assert!(!id.is_root());
        assert!(FiberId::ROOT.is_root());
    }

    #[test]
    fn test_fiber_id_formatting() {
        assert_eq!(format!("{}", FiberId::ROOT), "root");
        assert_eq!(format!("{:?}", FiberId::new(7)), "FiberId(7)");
        assert_eq!(format!("{}", FiberId::new(7)), "7");
    }

    #[test]
    fn test_fiber_id_conversions() {
        let id: FiberId = 100u32.into();
        let raw: u32 = id.into();
        assert_eq!(raw, 100);
    }
}
