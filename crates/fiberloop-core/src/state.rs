//! Fiber resume states

use core::fmt;

/// State of a fiber
///
/// When a suspended fiber is resumed, the state it was scheduled with is
/// the value its suspension point returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FiberState {
    /// Freshly allocated or just re-armed with a task
    Created = 0,

    /// Suspended, waiting for an explicit resume
    Sleep = 1,

    /// Scheduled for the next chain run
    Ready = 2,

    /// Forcibly resumed by loop shutdown or channel close
    Canceled = 3,

    /// Resumed because its deadline elapsed
    Expired = 4,

    /// Body returned, parked in the cache for reuse
    Cached = 5,
}

impl FiberState {
    /// Whether a wake with this state was a normal one
    #[inline]
    pub const fn is_ready(&self) -> bool {
        matches!(self, FiberState::Ready)
    }

    /// Whether the fiber was woken without the event it waited for
    #[inline]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, FiberState::Canceled | FiberState::Expired)
    }
}

impl From<u8> for FiberState {
    fn from(v: u8) -> Self {
        match v {
            0 => FiberState::Created,
            1 => FiberState::Sleep,
            2 => FiberState::Ready,
            3 => FiberState::Canceled,
            4 => FiberState::Expired,
            5 => FiberState::Cached,
            _ => FiberState::Created,
        }
    }
}

impl From<FiberState> for u8 {
    fn from(state: FiberState) -> u8 {
        state as u8
    }
}

impl fmt::Display for FiberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FiberState::Created => "created",
            FiberState::Sleep => "sleep",
            FiberState::Ready => "ready",
            FiberState::Canceled => "canceled",
            FiberState::Expired => "expired",
            FiberState::Cached => "cached",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(FiberState::Ready.is_ready());
        assert!(!FiberState::Sleep.is_ready());

        assert!(FiberState::Canceled.is_interrupted());
        assert!(FiberState::Expired.is_interrupted());
        assert!(!FiberState::Ready.is_interrupted());
        assert!(!FiberState::Cached.is_interrupted());
    }

    #[test]
    fn test_state_u8_roundtrip() {
        for raw in 0..=5u8 {
            assert_eq!(u8::from(FiberState::from(raw)), raw);
        }
        assert_eq!(FiberState::from(200), FiberState::Created);
    }
}
