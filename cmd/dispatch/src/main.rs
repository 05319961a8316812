//! Blocking offload example
//!
//! One fiber hands a slow computation to the blocking pool while another
//! keeps ticking on the loop.

use fiberloop::{run, run_blocking, sleep_for, spawn, Deadline, DispatchError};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn slow_sum(n: u64) -> Result<u64, String> {
    std::thread::sleep(Duration::from_millis(100));
    if n == 0 {
        return Err("nothing to sum".to_string());
    }
    Ok((1..=n).sum())
}

fn main() {
    println!("=== fiberloop Dispatch Example ===\n");

    let finished = Rc::new(Cell::new(false));

    let f = Rc::clone(&finished);
    let spawned = spawn(move || {
        for n in [1000, 0] {
            match run_blocking(Deadline::after(Duration::from_secs(5)), move || slow_sum(n)) {
                Ok(sum) => println!("  sum(1..={}) = {}", n, sum),
                Err(DispatchError::Task(e)) => println!("  task failed: {}", e),
                Err(DispatchError::Runtime(e)) => println!("  runtime error: {}", e),
            }
        }
        f.set(true);
    });
    if let Err(e) = spawned {
        eprintln!("spawn failed: {}", e);
    }

    let f = Rc::clone(&finished);
    let spawned = spawn(move || {
        let mut ticks = 0;
        while !f.get() {
            ticks += 1;
            sleep_for(Duration::from_millis(20));
        }
        println!("  ticker ran {} times meanwhile", ticks);
    });
    if let Err(e) = spawned {
        eprintln!("spawn failed: {}", e);
    }

    if let Err(e) = run() {
        eprintln!("loop failed: {}", e);
    }
    println!("\n=== Example Complete ===");
}
