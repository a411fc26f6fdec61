use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use twinpool::{Configuration, IoTarget, Scheduler, SchedulerError, StaticTopology};

fn scheduler(config: Configuration) -> Scheduler {
    Scheduler::with_topology(config, Arc::new(StaticTopology::new(2))).unwrap()
}

#[test]
fn test_shutdown_during_task_execution() {
    let scheduler = scheduler(Configuration::new().with_num_io_threads(2));
    let completed = Arc::new(AtomicUsize::new(0));

    // Submit multiple tasks that take some time
    for _ in 0..10 {
        let completed = completed.clone();
        scheduler
            .post_coroutine(move || {
                thread::sleep(Duration::from_millis(10));
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    // Shutdown should wait for all queued tasks to complete
    let result = scheduler.shutdown(Duration::from_secs(10));
    assert!(result.is_ok(), "Shutdown should succeed after tasks complete");
    assert_eq!(completed.load(Ordering::SeqCst), 10);
}

#[test]
fn test_zero_drain_timeout_with_pending_work() {
    let scheduler = scheduler(Configuration::new().with_num_io_threads(1));

    scheduler
        .post_coroutine(|| thread::sleep(Duration::from_millis(300)))
        .unwrap();
    scheduler
        .post_io(|| thread::sleep(Duration::from_millis(300)), IoTarget::Any)
        .unwrap();
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    let result = scheduler.shutdown(Duration::ZERO);
    assert!(start.elapsed() < Duration::from_millis(250));
    match result {
        Err(SchedulerError::ShutdownTimeout { abandoned }) => assert!(abandoned >= 2),
        other => panic!("expected shutdown timeout, got {:?}", other),
    }

    // All queues are closed regardless of the timeout.
    assert_eq!(scheduler.post_coroutine(|| {}), Err(SchedulerError::QueueClosed));
    assert_eq!(
        scheduler.post_io(|| {}, IoTarget::Any),
        Err(SchedulerError::QueueClosed)
    );
    assert_eq!(
        scheduler.post_coroutine_to(0, || {}),
        Err(SchedulerError::QueueClosed)
    );

    // The outcome is sticky.
    assert_eq!(scheduler.shutdown(Duration::from_secs(10)), result);
}

#[test]
fn test_concurrent_shutdown_calls_agree() {
    let scheduler = Arc::new(scheduler(Configuration::new().with_num_io_threads(2)));
    for _ in 0..20 {
        scheduler
            .post_io(|| thread::sleep(Duration::from_millis(5)), IoTarget::Any)
            .unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = scheduler.clone();
            thread::spawn(move || scheduler.shutdown(Duration::from_secs(10)))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(()));
    }
    assert_eq!(scheduler.io_stats().completed, 20);
}

#[test]
fn test_shared_mode_shutdown_wakes_sleeping_pollers() {
    // A long poll interval must not delay shutdown of idle workers.
    let scheduler = scheduler(
        Configuration::new()
            .with_num_io_threads(4)
            .with_load_balance_shared_io_queues(true)
            .with_load_balance_poll_interval(Duration::from_secs(30)),
    );
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    assert_eq!(scheduler.shutdown(Duration::from_secs(10)), Ok(()));
    assert!(start.elapsed() < Duration::from_secs(5));
}
