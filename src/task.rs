//! Task definitions and execution logic.
//!
//! A task is a unit of work posted to one of the pools. It wraps a closure
//! and an optional failure handler that receives the panic message if the
//! closure unwinds.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

type Work = Box<dyn FnOnce() + Send + 'static>;
type FailureHandler = Box<dyn FnOnce(TaskFailure) + Send + 'static>;

/// Describes a task whose body panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked with a non-string payload".to_string()
        };
        TaskFailure { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked: {}", self.message)
    }
}

/// Result of running a task on a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// A unit of work to be executed by a worker thread.
pub struct Task {
    work: Work,
    on_failure: Option<FailureHandler>,
}

impl Task {
    /// Creates a new task with the given work function.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            work: Box::new(work),
            on_failure: None,
        }
    }

    /// Creates a task whose panics are reported to `on_failure`.
    pub fn with_failure_handler<F, H>(work: F, on_failure: H) -> Self
    where
        F: FnOnce() + Send + 'static,
        H: FnOnce(TaskFailure) + Send + 'static,
    {
        Task {
            work: Box::new(work),
            on_failure: Some(Box::new(on_failure)),
        }
    }

    /// Runs the task to completion on the calling thread.
    ///
    /// A panic in the body is caught and handed to the failure handler. A
    /// panicking handler is swallowed as well so the calling worker survives.
    pub fn execute(self) -> TaskOutcome {
        let Task { work, on_failure } = self;
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(()) => TaskOutcome::Success,
            Err(payload) => {
                let failure = TaskFailure::from_panic(payload);
                if let Some(handler) = on_failure {
                    let report = failure.clone();
                    if panic::catch_unwind(AssertUnwindSafe(move || handler(report))).is_err() {
                        tracing::warn!("task failure handler panicked");
                    }
                }
                TaskOutcome::Failed(failure)
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("has_failure_handler", &self.on_failure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_task_execution() {
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        let task = Task::new(move || {
            executed_clone.store(true, Ordering::SeqCst);
        });

        assert!(task.execute().is_success());
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panic_is_reported_to_handler() {
        let reported = Arc::new(Mutex::new(None));
        let reported_clone = reported.clone();

        let task = Task::with_failure_handler(
            || panic!("disk on fire"),
            move |failure| {
                *reported_clone.lock() = Some(failure);
            },
        );

        let outcome = task.execute();
        let failure = reported.lock().clone().expect("handler not called");
        assert_eq!(failure.message(), "disk on fire");
        assert_eq!(outcome, TaskOutcome::Failed(failure));
    }

    #[test]
    fn test_formatted_panic_message() {
        let outcome = Task::new(|| panic!("code {}", 7)).execute();
        match outcome {
            TaskOutcome::Failed(failure) => assert_eq!(failure.message(), "code 7"),
            TaskOutcome::Success => panic!("expected failure"),
        }
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let task = Task::with_failure_handler(|| panic!("first"), |_| panic!("second"));
        assert!(!task.execute().is_success());
    }
}
