//! Idle parking for blocking-pool workers
//!
//! Workers park when the job queue is empty; `submit` wakes one, shutdown
//! wakes all. Wakes are epoch based: a park that starts after a wake was
//! issued returns immediately instead of sleeping through it.

use std::time::Duration;

pub trait WorkerParking: Send + Sync {
    /// Snapshot of the wake epoch. Take it before the final queue check
    /// and hand it to [`park`](Self::park).
    fn epoch(&self) -> u32;

    /// Sleep until a wake newer than `epoch` or `timeout`.
    ///
    /// Returns true when woken. Callers re-check the queue either way.
    fn park(&self, epoch: u32, timeout: Option<Duration>) -> bool;

    fn wake_one(&self);

    fn wake_all(&self);

    /// Parked worker count (hint, may be stale)
    fn parked_count(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::CondvarParking as PlatformParking;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_park_times_out() {
        let parking = PlatformParking::new();
        let start = Instant::now();
        let woken = parking.park(parking.epoch(), Some(Duration::from_millis(30)));
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_stale_epoch_returns_immediately() {
        let parking = PlatformParking::new();
        let epoch = parking.epoch();
        parking.wake_all();
        let start = Instant::now();
        assert!(parking.park(epoch, Some(Duration::from_secs(5))));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wake_one_releases_parked_thread() {
        let parking = Arc::new(PlatformParking::new());
        let sleeper = Arc::clone(&parking);
        let handle = thread::spawn(move || {
            let epoch = sleeper.epoch();
            sleeper.park(epoch, Some(Duration::from_secs(10)))
        });

        while parking.parked_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        parking.wake_one();
        assert!(handle.join().unwrap());
    }
}
