//! Integration tests for the dual-pool scheduler.

use crate::{Configuration, IoTarget, Scheduler, SchedulerError, StaticTopology, Task};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn scheduler(config: Configuration) -> Scheduler {
    Scheduler::with_topology(config, Arc::new(StaticTopology::new(4))).expect("scheduler")
}

#[test]
fn test_basic_task_execution() {
    let scheduler = scheduler(Configuration::new().with_num_io_threads(2));
    let value = Arc::new(AtomicUsize::new(0));
    let value_clone = value.clone();

    scheduler
        .post_coroutine(move || {
            value_clone.store(42, Ordering::SeqCst);
        })
        .unwrap();

    scheduler.shutdown(Duration::from_secs(5)).expect("Shutdown failed");
    assert_eq!(value.load(Ordering::SeqCst), 42);
}

#[test]
fn test_parallel_task_execution() {
    let scheduler = scheduler(Configuration::new().with_num_io_threads(2));
    let sum = Arc::new(AtomicUsize::new(0));

    let num_tasks = 100;
    for i in 0..num_tasks {
        let sum_clone = sum.clone();
        scheduler
            .post_coroutine(move || {
                sum_clone.fetch_add(i, Ordering::SeqCst);
            })
            .unwrap();
    }

    scheduler.shutdown(Duration::from_secs(5)).expect("Shutdown failed");
    let expected_sum: usize = (0..num_tasks).sum();
    assert_eq!(sum.load(Ordering::SeqCst), expected_sum);
}

#[test]
fn test_explicit_queue_preserves_fifo() {
    let scheduler = scheduler(Configuration::new().with_num_io_threads(2));
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..200 {
        let order = order.clone();
        scheduler
            .post_coroutine_to(2, move || order.lock().push(i))
            .unwrap();
    }

    scheduler.shutdown(Duration::from_secs(5)).unwrap();
    assert_eq!(*order.lock(), (0..200).collect::<Vec<_>>());
}

#[test]
fn test_coroutine_tasks_land_on_chosen_worker() {
    let scheduler = scheduler(Configuration::new().with_num_io_threads(2));
    let names = Arc::new(Mutex::new(HashSet::new()));

    for _ in 0..20 {
        let names = names.clone();
        scheduler
            .post_coroutine_to(1, move || {
                let name = thread::current().name().unwrap_or_default().to_string();
                names.lock().insert(name);
            })
            .unwrap();
    }

    scheduler.shutdown(Duration::from_secs(5)).unwrap();
    let names = names.lock();
    assert_eq!(names.len(), 1);
    assert!(names.contains("coro-1"));
}

#[test]
fn test_failure_handler_receives_panic() {
    let scheduler = scheduler(Configuration::new().with_num_io_threads(1));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let failures_clone = failures.clone();

    scheduler
        .submit_io(
            Task::with_failure_handler(
                || panic!("connection reset"),
                move |failure| failures_clone.lock().push(failure),
            ),
            IoTarget::Any,
        )
        .unwrap();

    scheduler.shutdown(Duration::from_secs(5)).unwrap();
    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].message(), "connection reset");
    assert_eq!(scheduler.io_stats().failed, 1);
}

#[test]
fn test_independent_schedulers_coexist() {
    let first = scheduler(Configuration::new().with_num_io_threads(1));
    let second = scheduler(Configuration::new().with_num_io_threads(1));

    first.shutdown(Duration::from_secs(5)).unwrap();
    assert_eq!(first.post_coroutine(|| {}), Err(SchedulerError::QueueClosed));
    assert!(second.post_coroutine(|| {}).is_ok());
    second.shutdown(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_drop_without_shutdown_drains() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let scheduler = scheduler(Configuration::new().with_num_io_threads(1));
        for _ in 0..10 {
            let counter = counter.clone();
            scheduler
                .post_io(
                    move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    },
                    IoTarget::Any,
                )
                .unwrap();
        }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}
