use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use twinpool::{BackoffPolicy, Configuration, IoTarget, Scheduler};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("twinpool - Dual Coroutine/IO Worker Pools\n");

    let config = Configuration::new()
        .with_num_io_threads(4)
        .with_load_balance_shared_io_queues(true)
        .with_load_balance_poll_interval(Duration::from_millis(5))
        .with_load_balance_poll_interval_backoff_policy(BackoffPolicy::Exponential)
        .with_load_balance_poll_interval_num_backoffs(4);

    let scheduler = match Scheduler::new(config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            eprintln!("Failed to start scheduler: {}", e);
            std::process::exit(1);
        }
    };
    println!(
        "Started {} coroutine threads and {} IO threads ({:?} IO queues)\n",
        scheduler.num_coroutine_threads(),
        scheduler.num_io_threads(),
        scheduler.io_queue_mode()
    );

    // Example 1: Coroutine tasks spread round-robin
    println!("Example 1: Coroutine tasks");
    let sum = Arc::new(AtomicUsize::new(0));
    let num_tasks = 100;
    let start = Instant::now();
    for i in 0..num_tasks {
        let sum = sum.clone();
        if let Err(e) = scheduler.post_coroutine(move || {
            sum.fetch_add(i, Ordering::SeqCst);
        }) {
            eprintln!("  post failed: {}", e);
        }
    }

    // Example 2: Blocking IO tasks on the shared queue
    println!("Example 2: IO tasks on a shared queue");
    let io_done = Arc::new(AtomicUsize::new(0));
    for _ in 0..20 {
        let io_done = io_done.clone();
        if let Err(e) = scheduler.post_io(
            move || {
                std::thread::sleep(Duration::from_millis(10));
                io_done.fetch_add(1, Ordering::SeqCst);
            },
            IoTarget::Any,
        ) {
            eprintln!("  post failed: {}", e);
        }
    }

    println!("\nShutting down scheduler...");
    match scheduler.shutdown(Duration::from_secs(5)) {
        Ok(()) => println!("Done in {:?}", start.elapsed()),
        Err(e) => eprintln!("Shutdown error: {}", e),
    }

    let expected_sum: usize = (0..num_tasks).sum();
    println!(
        "  Coroutine sum: {} (expected: {})",
        sum.load(Ordering::SeqCst),
        expected_sum
    );
    println!("  IO tasks completed: {}", io_done.load(Ordering::SeqCst));
    println!("  IO queue stats: {:?}", scheduler.io_stats());
}
