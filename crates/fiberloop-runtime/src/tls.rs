//! Per-thread event loop accessor
//!
//! Every thread gets its own loop on first use. The loop is never shared
//! across threads; handing work to another thread goes through
//! `EventLoop::run_blocking`.

use crate::config::RuntimeConfig;
use crate::event_loop::EventLoop;
use fiberloop_core::{kfatal, kwarn, FiberResult};
use std::cell::OnceCell;
use std::rc::Rc;

thread_local! {
    static LOOP: OnceCell<Rc<EventLoop>> = const { OnceCell::new() };
}

/// This thread's loop, built from `RuntimeConfig::from_env()` on first use
pub fn try_current_loop() -> FiberResult<Rc<EventLoop>> {
    init_with(RuntimeConfig::from_env)
}

/// Like [`try_current_loop`], aborting if the loop cannot be built
pub fn current_loop() -> Rc<EventLoop> {
    match try_current_loop() {
        Ok(lp) => lp,
        Err(e) => kfatal!("event loop setup failed: {}", e),
    }
}

/// Build this thread's loop from `config`. If the loop already exists it
/// is returned unchanged.
pub fn init_loop(config: RuntimeConfig) -> FiberResult<Rc<EventLoop>> {
    if is_loop_initialized() {
        kwarn!("event loop already initialized on this thread; config ignored");
    }
    init_with(move || config)
}

pub fn is_loop_initialized() -> bool {
    LOOP.with(|cell| cell.get().is_some())
}

fn init_with(config: impl FnOnce() -> RuntimeConfig) -> FiberResult<Rc<EventLoop>> {
    LOOP.with(|cell| {
        if let Some(lp) = cell.get() {
            return Ok(Rc::clone(lp));
        }
        let lp = Rc::new(EventLoop::new(config())?);
        Ok(Rc::clone(cell.get_or_init(|| lp)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_same_thread_same_loop() {
        let a = current_loop();
        let b = current_loop();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(is_loop_initialized());
        assert!(!a.is_main());
    }

    #[test]
    fn test_threads_get_distinct_loops() {
        let here = Rc::as_ptr(&current_loop()) as usize;
        let there = thread::spawn(|| Rc::as_ptr(&current_loop()) as usize)
            .join()
            .unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_init_loop_applies_config_once() {
        thread::spawn(|| {
            let config = RuntimeConfig::new().poll_batch(8);
            let lp = init_loop(config).unwrap();
            assert_eq!(lp.config().poll_batch, 8);

            let again = init_loop(RuntimeConfig::new().poll_batch(64)).unwrap();
            assert!(Rc::ptr_eq(&lp, &again));
            assert_eq!(again.config().poll_batch, 8);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        thread::spawn(|| {
            let err = init_loop(RuntimeConfig::new().stack_size(0)).unwrap_err();
            assert!(matches!(err, fiberloop_core::FiberError::Config(_)));
            assert!(!is_loop_initialized());
        })
        .join()
        .unwrap();
    }
}
