//! Basic fiberloop example
//!
//! Spawns a few fibers that yield and sleep, then runs the loop until
//! they are all done.
//!
//! # Environment Variables
//!
//! - `FIBER_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `FIBER_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use fiberloop::{kdebug, kinfo};
use fiberloop::{now, run, sleep_for, spawn, yield_now};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

// FIBER_LOG_LEVEL=debug cargo run -p fiberloop-basic
fn main() {
    println!("=== fiberloop Basic Example ===\n");

    let completed = Rc::new(Cell::new(0));
    let start = Instant::now();

    for i in 1..=3 {
        let c = Rc::clone(&completed);
        match spawn(move || {
            kdebug!("[fiber {}] started", i);
            for j in 0..3 {
                kdebug!("[fiber {}] iteration {}", i, j);
                yield_now();
            }
            c.set(c.get() + 1);
            kdebug!("[fiber {}] finished", i);
        }) {
            Ok(id) => println!("Spawned yielding fiber {} (ID={})", i, id),
            Err(e) => eprintln!("spawn failed: {}", e),
        }
    }

    for ms in [30u64, 10, 20] {
        let c = Rc::clone(&completed);
        let spawned = spawn(move || {
            let state = sleep_for(Duration::from_millis(ms));
            println!(
                "  sleeper {}ms woke {:?} at +{}ms",
                ms,
                state,
                now().duration_since(start).as_millis()
            );
            c.set(c.get() + 1);
        });
        if let Err(e) = spawned {
            eprintln!("spawn failed: {}", e);
        }
    }

    println!("\nRunning the loop...\n");
    if let Err(e) = run() {
        eprintln!("loop failed: {}", e);
    }

    kinfo!("{} fiber(s) completed", completed.get());
    println!("\n=== Example Complete ===");
}
