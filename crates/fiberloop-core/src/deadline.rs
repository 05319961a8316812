//! Absolute deadlines
//!
//! Every wait in the runtime is bounded by a [`Deadline`]: either a point on
//! the monotonic clock or `Never`. The derived ordering places `Never` after
//! every instant, so "earliest deadline" comparisons need no special casing.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Deadline {
    /// Expires once the monotonic clock reaches this instant
    At(Instant),
    /// Infinite future
    #[default]
    Never,
}

impl Deadline {
    /// Deadline `d` from the current instant; saturates to `Never`
    pub fn after(d: Duration) -> Self {
        Self::after_from(Instant::now(), d)
    }

    /// Deadline `d` past `base`; saturates to `Never`
    pub fn after_from(base: Instant, d: Duration) -> Self {
        match base.checked_add(d) {
            Some(at) => Deadline::At(at),
            None => Deadline::Never,
        }
    }

    /// Whether `now` has reached this deadline
    #[inline]
    pub fn is_elapsed(&self, now: Instant) -> bool {
        match self {
            Deadline::At(at) => *at <= now,
            Deadline::Never => false,
        }
    }

    /// Time left until the deadline, `None` meaning wait forever
    #[inline]
    pub fn timeout_from(&self, now: Instant) -> Option<Duration> {
        match self {
            Deadline::At(at) => Some(at.saturating_duration_since(now)),
            Deadline::Never => None,
        }
    }

    #[inline]
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::At(at) => Some(*at),
            Deadline::Never => None,
        }
    }

    #[inline]
    pub fn is_never(&self) -> bool {
        matches!(self, Deadline::Never)
    }
}

impl From<Instant> for Deadline {
    fn from(at: Instant) -> Self {
        Deadline::At(at)
    }
}

impl From<Option<Instant>> for Deadline {
    fn from(at: Option<Instant>) -> Self {
        at.map_or(Deadline::Never, Deadline::At)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_is_greatest() {
        let now = Instant::now();
        let soon = Deadline::At(now);
        let later = Deadline::At(now + Duration::from_secs(3600));
        assert!(soon < later);
        assert!(later < Deadline::Never);
        assert_eq!(soon.min(Deadline::Never), soon);
        assert_eq!(Deadline::default(), Deadline::Never);
    }

    #[test]
    fn test_elapsed_and_timeout() {
        let now = Instant::now();
        let past = Deadline::At(now);
        let future = Deadline::after_from(now, Duration::from_millis(250));

        assert!(past.is_elapsed(now));
        assert!(!future.is_elapsed(now));
        assert!(!Deadline::Never.is_elapsed(now));

        assert_eq!(past.timeout_from(now + Duration::from_secs(1)), Some(Duration::ZERO));
        assert_eq!(future.timeout_from(now), Some(Duration::from_millis(250)));
        assert_eq!(Deadline::Never.timeout_from(now), None);
    }

    #[test]
    fn test_after_saturates() {
        assert_eq!(Deadline::after(Duration::MAX), Deadline::Never);
        assert!(Deadline::after(Duration::from_secs(1)).instant().is_some());
    }
}
