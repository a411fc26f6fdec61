//! Worker thread implementation.
//!
//! A worker is one OS thread bound to one [`TaskQueue`]. In dedicated mode it
//! blocks on its own queue; in shared mode it polls a queue read by the whole
//! pool and backs off while the queue stays empty. Tasks run synchronously on
//! the worker and their panics are contained, so a failing task never takes
//! the worker down.

use crate::backoff::{BackoffSettings, PollState};
use crate::error::SchedulerError;
use crate::queue::{Popped, TaskQueue};
use crate::task::{Task, TaskOutcome};
use crate::topology::CpuTopology;
use crossbeam::channel::{self, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long a dedicated worker blocks before re-checking its queue.
pub const DEDICATED_POP_TIMEOUT: Duration = Duration::from_millis(50);

/// Lifecycle of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    /// Queue closed; finishing the tasks still queued.
    Draining = 2,
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Terminated,
        }
    }
}

/// The queue a worker reads and how it waits on it.
#[derive(Debug, Clone)]
pub enum QueueBinding {
    /// Exclusive queue, read with a blocking wait.
    Dedicated(Arc<TaskQueue>),
    /// Queue shared with other workers, read by polling with backoff.
    Shared {
        queue: Arc<TaskQueue>,
        settings: BackoffSettings,
    },
}

impl QueueBinding {
    pub fn queue(&self) -> &Arc<TaskQueue> {
        match self {
            QueueBinding::Dedicated(queue) => queue,
            QueueBinding::Shared { queue, .. } => queue,
        }
    }
}

/// Core affinity request for a worker.
#[derive(Debug, Clone)]
pub struct Pinning {
    pub topology: Arc<dyn CpuTopology>,
    pub core: usize,
}

/// Everything needed to start a worker.
#[derive(Debug)]
pub struct WorkerConfig {
    pub id: usize,
    pub name: String,
    pub binding: QueueBinding,
    pub pinning: Option<Pinning>,
    /// Receives the worker id when the thread leaves its loop.
    pub exits: Sender<usize>,
}

/// A worker thread that executes tasks from its queue.
#[derive(Debug)]
pub struct WorkerThread {
    id: usize,
    name: String,
    core: Option<usize>,
    state: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Starts a worker and waits until it is running.
    ///
    /// When pinning is requested the new thread pins itself first; a pinning
    /// error is returned here and the thread is joined before returning.
    pub fn spawn(config: WorkerConfig) -> Result<Self, SchedulerError> {
        let WorkerConfig {
            id,
            name,
            binding,
            pinning,
            exits,
        } = config;

        let state = Arc::new(AtomicU8::new(WorkerState::Created as u8));
        let core = pinning.as_ref().map(|p| p.core);
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), SchedulerError>>(1);

        let thread_state = state.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _exit = ExitGuard {
                    id,
                    state: thread_state.clone(),
                    exits,
                };

                if let Some(pinning) = pinning {
                    if let Err(e) = pinning.topology.pin_current_thread(pinning.core) {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                    tracing::debug!(worker = %thread_name, core = pinning.core, "pinned worker thread");
                }

                let _ = thread_state.compare_exchange(
                    WorkerState::Created as u8,
                    WorkerState::Running as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                let _ = ready_tx.send(Ok(()));

                WorkerThread::run_loop(&thread_name, &binding);
            })
            .map_err(|e| SchedulerError::ThreadSpawn {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        let startup = ready_rx.recv();
        match startup {
            Ok(Ok(())) => Ok(WorkerThread {
                id,
                name,
                core,
                state,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SchedulerError::ThreadSpawn {
                    name,
                    reason: "worker exited during startup".to_string(),
                })
            }
        }
    }

    /// Fetch-execute loop. Returns once the queue is closed and drained.
    fn run_loop(name: &str, binding: &QueueBinding) {
        let mut source = Source::new(binding);
        tracing::debug!(worker = name, "worker started");

        loop {
            match source.next() {
                Popped::Task(task) => WorkerThread::execute(name, binding.queue(), task),
                Popped::Empty => continue,
                Popped::Closed => break,
            }
        }

        tracing::debug!(worker = name, "worker drained, exiting");
    }

    fn execute(name: &str, queue: &TaskQueue, task: Task) {
        let stats = queue.stats();
        match task.execute() {
            TaskOutcome::Success => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Failed(failure) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker = name, error = %failure, "task failed");
            }
        }
    }

    /// Returns the worker's ID.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical core the worker was pinned to, if any.
    pub fn core(&self) -> Option<usize> {
        self.core
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Marks a running worker as draining. Its queue must be closed already.
    pub fn begin_drain(&self) {
        let _ = self.state.compare_exchange(
            WorkerState::Running as u8,
            WorkerState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Waits for the worker thread to finish.
    pub fn join(mut self) -> thread::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.join()
        } else {
            Ok(())
        }
    }
}

/// Pop strategy for one worker. Shared-mode workers keep their own poll state.
enum Source<'a> {
    Blocking(&'a TaskQueue),
    Polling {
        queue: &'a TaskQueue,
        settings: BackoffSettings,
        state: PollState,
    },
}

impl<'a> Source<'a> {
    fn new(binding: &'a QueueBinding) -> Self {
        match binding {
            QueueBinding::Dedicated(queue) => Source::Blocking(queue),
            QueueBinding::Shared { queue, settings } => Source::Polling {
                queue,
                settings: *settings,
                state: PollState::new(settings),
            },
        }
    }

    fn next(&mut self) -> Popped {
        match self {
            Source::Blocking(queue) => queue.pop_blocking(DEDICATED_POP_TIMEOUT),
            Source::Polling {
                queue,
                settings,
                state,
            } => queue.pop_polling(state, settings),
        }
    }
}

/// Marks the worker terminated and reports its exit, even when unwinding.
struct ExitGuard {
    id: usize,
    state: Arc<AtomicU8>,
    exits: Sender<usize>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.state
            .store(WorkerState::Terminated as u8, Ordering::Release);
        let _ = self.exits.send(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::topology::StaticTopology;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Debug)]
    struct RejectingTopology;

    impl CpuTopology for RejectingTopology {
        fn logical_cores(&self) -> usize {
            1
        }

        fn pin_current_thread(&self, core: usize) -> Result<(), SchedulerError> {
            Err(SchedulerError::PinningFailure {
                core,
                reason: "denied".to_string(),
            })
        }
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let start = Instant::now();
        while !condition() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out waiting");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_dedicated_worker_executes_and_drains() {
        let queue = Arc::new(TaskQueue::new());
        let (exits_tx, exits_rx) = channel::unbounded();
        let worker = WorkerThread::spawn(WorkerConfig {
            id: 0,
            name: "test-0".to_string(),
            binding: QueueBinding::Dedicated(queue.clone()),
            pinning: None,
            exits: exits_tx,
        })
        .unwrap();
        assert_eq!(worker.state(), WorkerState::Running);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = counter.clone();
            queue
                .push(Task::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        queue.close();
        worker.begin_drain();
        assert_eq!(exits_rx.recv_timeout(Duration::from_secs(5)), Ok(0));
        assert_eq!(worker.state(), WorkerState::Terminated);
        worker.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(queue.stats_snapshot().completed, 20);
    }

    #[test]
    fn test_shared_worker_polls() {
        let settings = BackoffSettings::new(BackoffPolicy::Linear, Duration::from_millis(1), 3);
        let queue = Arc::new(TaskQueue::new());
        let (exits_tx, exits_rx) = channel::unbounded();
        let worker = WorkerThread::spawn(WorkerConfig {
            id: 7,
            name: "shared-7".to_string(),
            binding: QueueBinding::Shared {
                queue: queue.clone(),
                settings,
            },
            pinning: None,
            exits: exits_tx,
        })
        .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        queue
            .push(Task::new(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        wait_until(|| counter.load(Ordering::SeqCst) == 1);

        queue.close();
        assert_eq!(exits_rx.recv_timeout(Duration::from_secs(5)), Ok(7));
        worker.join().unwrap();
    }

    #[test]
    fn test_worker_survives_panicking_task() {
        let queue = Arc::new(TaskQueue::new());
        let (exits_tx, _exits_rx) = channel::unbounded();
        let worker = WorkerThread::spawn(WorkerConfig {
            id: 0,
            name: "test-0".to_string(),
            binding: QueueBinding::Dedicated(queue.clone()),
            pinning: None,
            exits: exits_tx,
        })
        .unwrap();

        queue.push(Task::new(|| panic!("boom"))).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        queue
            .push(Task::new(move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        wait_until(|| ran.load(Ordering::SeqCst) == 1);
        let snapshot = queue.stats_snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.completed, 1);

        queue.close();
        worker.join().unwrap();
    }

    #[test]
    fn test_pinned_worker_records_core() {
        let queue = Arc::new(TaskQueue::new());
        let (exits_tx, _exits_rx) = channel::unbounded();
        let worker = WorkerThread::spawn(WorkerConfig {
            id: 2,
            name: "pinned-2".to_string(),
            binding: QueueBinding::Dedicated(queue.clone()),
            pinning: Some(Pinning {
                topology: Arc::new(StaticTopology::new(4)),
                core: 2,
            }),
            exits: exits_tx,
        })
        .unwrap();
        assert_eq!(worker.core(), Some(2));

        queue.close();
        worker.join().unwrap();
    }

    #[test]
    fn test_pinning_failure_is_a_spawn_error() {
        let (exits_tx, _exits_rx) = channel::unbounded();
        let result = WorkerThread::spawn(WorkerConfig {
            id: 0,
            name: "pinned-0".to_string(),
            binding: QueueBinding::Dedicated(Arc::new(TaskQueue::new())),
            pinning: Some(Pinning {
                topology: Arc::new(RejectingTopology),
                core: 0,
            }),
            exits: exits_tx,
        });
        assert!(matches!(
            result,
            Err(SchedulerError::PinningFailure { core: 0, .. })
        ));
    }
}
