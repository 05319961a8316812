//! Blocking pool
//!
//! A fixed set of OS threads that run jobs which would stall an event
//! loop. Jobs go through a bounded lock-free queue; idle workers park on
//! the platform parking primitive and are woken per submission.
//!
//! No dynamic scaling: the pool is sized once from `RuntimeConfig`.

use crate::config::RuntimeConfig;
use crate::parking::{PlatformParking, WorkerParking};

use fiberloop_core::{kdebug, kerror, FiberResult, WorkerError};

use crossbeam_queue::ArrayQueue;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolInner {
    jobs: ArrayQueue<Job>,
    parking: PlatformParking,
    /// Workers currently running a job
    active: AtomicUsize,
    shutdown: AtomicBool,
    park_timeout: Duration,
}

pub struct BlockingPool {
    inner: Arc<PoolInner>,
    handles: Vec<thread::JoinHandle<()>>,
}

static GLOBAL: OnceLock<BlockingPool> = OnceLock::new();

impl BlockingPool {
    /// Start `workers` threads sharing a queue of `queue_depth` jobs
    pub fn new(workers: usize, queue_depth: usize, park_timeout: Duration) -> FiberResult<Self> {
        let workers = workers.max(1);
        let inner = Arc::new(PoolInner {
            jobs: ArrayQueue::new(queue_depth.max(1)),
            parking: PlatformParking::new(),
            active: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            park_timeout,
        });

        let mut pool = BlockingPool {
            inner,
            handles: Vec::with_capacity(workers),
        };
        for index in 0..workers {
            let inner = Arc::clone(&pool.inner);
            let handle = thread::Builder::new()
                .name(format!("fiber-blocking-{}", index))
                .spawn(move || worker_loop(inner))
                .map_err(|e| {
                    kerror!("blocking worker {} failed to start: {}", index, e);
                    WorkerError::SpawnFailed
                })?;
            pool.handles.push(handle);
        }
        kdebug!("blocking pool up: {} workers, queue {}", workers, queue_depth);
        Ok(pool)
    }

    pub fn from_config(config: &RuntimeConfig) -> FiberResult<Self> {
        Self::new(
            config.blocking_workers,
            config.blocking_queue_depth,
            config.park_timeout,
        )
    }

    /// Process-wide pool, started on first use from the environment
    pub fn global() -> FiberResult<&'static BlockingPool> {
        if let Some(pool) = GLOBAL.get() {
            return Ok(pool);
        }
        let pool = BlockingPool::from_config(&RuntimeConfig::from_env())?;
        // A racing initializer may win; the loser shuts down on drop
        Ok(GLOBAL.get_or_init(|| pool))
    }

    /// Queue `job` for a worker
    pub fn submit<F>(&self, job: F) -> FiberResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(WorkerError::ShutDown.into());
        }
        self.inner
            .jobs
            .push(Box::new(job))
            .map_err(|_| WorkerError::QueueFull)?;
        self.inner.parking.wake_one();
        Ok(())
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Stop accepting jobs; workers exit after their current job
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.parking.wake_all();
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        if let Some(job) = inner.jobs.pop() {
            inner.active.fetch_add(1, Ordering::Relaxed);
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                kerror!("blocking job panicked");
            }
            inner.active.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        let epoch = inner.parking.epoch();
        if !inner.jobs.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            continue;
        }
        inner.parking.park(epoch, Some(inner.park_timeout));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiberloop_core::FiberError;
    use std::sync::mpsc;

    #[test]
    fn test_jobs_run_on_named_workers() {
        let pool = BlockingPool::new(2, 8, Duration::from_millis(5)).unwrap();
        assert_eq!(pool.workers(), 2);

        let (tx, rx) = mpsc::channel();
        for n in 0..4 {
            let tx = tx.clone();
            pool.submit(move || {
                let name = thread::current().name().map(str::to_owned);
                tx.send((n, name)).unwrap();
            })
            .unwrap();
        }

        let mut seen: Vec<_> = (0..4).map(|_| rx.recv().unwrap()).collect();
        seen.sort_by_key(|(n, _)| *n);
        for (n, (got, name)) in seen.into_iter().enumerate() {
            assert_eq!(got, n);
            assert!(name.unwrap().starts_with("fiber-blocking-"));
        }
    }

    #[test]
    fn test_full_queue_is_reported() {
        let pool = BlockingPool::new(1, 1, Duration::from_millis(5)).unwrap();
        let (block_tx, block_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        pool.submit(move || {
            started_tx.send(()).unwrap();
            let _ = block_rx.recv();
        })
        .unwrap();
        started_rx.recv().unwrap();

        pool.submit(|| {}).unwrap();
        assert_eq!(
            pool.submit(|| {}).unwrap_err(),
            FiberError::Worker(WorkerError::QueueFull)
        );
        drop(block_tx);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = BlockingPool::new(1, 4, Duration::from_millis(5)).unwrap();
        pool.submit(|| panic!("job failed")).unwrap();

        let (tx, rx) = mpsc::channel();
        pool.submit(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn test_shutdown_rejects_jobs() {
        let pool = BlockingPool::new(1, 4, Duration::from_millis(5)).unwrap();
        pool.shutdown();
        assert_eq!(
            pool.submit(|| {}).unwrap_err(),
            FiberError::Worker(WorkerError::ShutDown)
        );
    }
}
