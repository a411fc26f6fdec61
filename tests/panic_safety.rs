use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use twinpool::{Configuration, IoTarget, Scheduler, StaticTopology};

fn wait_for(flag: &AtomicBool) {
    let start = Instant::now();
    while !flag.load(Ordering::SeqCst) {
        if start.elapsed() > Duration::from_secs(5) {
            panic!("Worker did not process subsequent task!");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_coroutine_worker_recovery_after_panic() {
    let scheduler = Scheduler::with_topology(
        Configuration::new()
            .with_num_coroutine_threads(1)
            .with_num_io_threads(1),
        Arc::new(StaticTopology::new(1)),
    )
    .unwrap();

    // 1. Submit panicking task
    scheduler.post_coroutine(|| panic!("Boom")).unwrap();

    // 2. Submit normal task to verify the single worker is still alive
    let success = Arc::new(AtomicBool::new(false));
    let success_clone = success.clone();
    scheduler
        .post_coroutine(move || {
            success_clone.store(true, Ordering::SeqCst);
        })
        .unwrap();

    wait_for(&success);
    assert_eq!(scheduler.coroutine_stats().failed, 1);
    assert_eq!(scheduler.coroutine_stats().completed, 1);
    scheduler.shutdown(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_shared_io_worker_recovery_after_panic() {
    let scheduler = Scheduler::with_topology(
        Configuration::new()
            .with_num_coroutine_threads(1)
            .with_num_io_threads(1)
            .with_load_balance_shared_io_queues(true)
            .with_load_balance_poll_interval(Duration::from_millis(1)),
        Arc::new(StaticTopology::new(1)),
    )
    .unwrap();

    for _ in 0..3 {
        scheduler
            .post_io(|| panic!("Intentional panic for testing"), IoTarget::Any)
            .unwrap();
    }

    let success = Arc::new(AtomicBool::new(false));
    let success_clone = success.clone();
    scheduler
        .post_io(
            move || {
                success_clone.store(true, Ordering::SeqCst);
            },
            IoTarget::Any,
        )
        .unwrap();

    wait_for(&success);
    assert_eq!(scheduler.io_stats().failed, 3);
    scheduler.shutdown(Duration::from_secs(5)).unwrap();
}
