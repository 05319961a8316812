//! Channel and broadcast example
//!
//! A producer feeds a rendezvous channel, two consumers drain it, and a
//! broadcast announces when production is over.

use fiberloop::{kinfo, run, sleep_for, spawn, Broadcast, Channel};
use std::rc::Rc;
use std::time::Duration;

fn main() {
    println!("=== fiberloop Channel Example ===\n");

    let jobs: Rc<Channel<u32>> = Rc::new(Channel::new(0));
    let done: Rc<Broadcast<&'static str>> = Rc::new(Broadcast::new());

    for name in ["alpha", "beta"] {
        let done = Rc::clone(&done);
        let spawned = spawn(move || match done.wait() {
            Some(msg) => println!("  [{}] heard: {}", name, msg),
            None => println!("  [{}] canceled", name),
        });
        if let Err(e) = spawned {
            eprintln!("spawn failed: {}", e);
        }
    }

    for name in ["consumer-1", "consumer-2"] {
        let jobs = Rc::clone(&jobs);
        let spawned = spawn(move || {
            let mut total = 0;
            while let Some(job) = jobs.read() {
                println!("  [{}] job {}", name, job);
                total += job;
                sleep_for(Duration::from_millis(5));
            }
            kinfo!("{} done, total {}", name, total);
        });
        if let Err(e) = spawned {
            eprintln!("spawn failed: {}", e);
        }
    }

    let (producer_jobs, producer_done) = (Rc::clone(&jobs), Rc::clone(&done));
    let spawned = spawn(move || {
        for job in 1..=6 {
            if !producer_jobs.write(job) {
                break;
            }
        }
        println!("  [producer] {} listener(s)", producer_done.subscribers());
        producer_done.dispatch("production finished");
        producer_jobs.close();
    });
    if let Err(e) = spawned {
        eprintln!("spawn failed: {}", e);
    }

    if let Err(e) = run() {
        eprintln!("loop failed: {}", e);
    }
    println!("\n=== Example Complete ===");
}
