//! Bounded parallel execution with joint failure reporting.

use core::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt as _;
use tokio::task::JoinSet;

use crate::cancel::CancelHandle;
use crate::error::{Result, RunnerError};
use crate::failure_log::FailureLog;
use crate::limiter::ConcurrencyLimiter;
use crate::report::{ExecutionReport, FailureKind, TaskFailure};
use crate::task::Task;

/// Runs tasks concurrently, never exceeding the limiter's capacity.
///
/// All tasks run to completion even when some fail; failures are reported
/// together once the last task has finished.
#[derive(Debug, Clone)]
pub struct ParallelRunner {
    limiter: ConcurrencyLimiter,
}

impl ParallelRunner {
    /// Create a runner sharing the given limiter.
    pub fn new(limiter: ConcurrencyLimiter) -> Self {
        Self { limiter }
    }

    /// The limiter gating this runner.
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Run all tasks in parallel and wait for every one of them.
    ///
    /// # Errors
    /// Returns [`RunnerError::Aggregate`] listing every failed or panicked task.
    pub async fn run(&self, tasks: Vec<Task>, cancel: &CancelHandle) -> Result<()> {
        self.run_report(tasks, cancel).await.into_result()
    }

    /// [`ParallelRunner::run`] with a handle that is never cancelled.
    ///
    /// # Errors
    /// Returns [`RunnerError::Aggregate`] listing every failed or panicked task.
    pub async fn run_background(&self, tasks: Vec<Task>) -> Result<()> {
        self.run(tasks, &CancelHandle::background()).await
    }

    /// Run all tasks in parallel and return the collected failures.
    pub async fn run_report(&self, tasks: Vec<Task>, cancel: &CancelHandle) -> ExecutionReport {
        if tasks.is_empty() {
            return ExecutionReport::default();
        }

        let start = Instant::now();
        let total = tasks.len();
        let failures = FailureLog::default();
        let mut join_set = JoinSet::new();

        tracing::debug!(
            "Running {total} tasks with at most {} in parallel",
            self.limiter.capacity()
        );

        for task in tasks {
            join_set.spawn(run_one(
                task,
                self.limiter.clone(),
                cancel.clone(),
                failures.clone(),
            ));
        }

        while let Some(joined) = join_set.join_next().await {
            // Workers catch their own panics, so this only sees runtime-level aborts.
            if let Err(err) = joined {
                let kind = if err.is_panic() {
                    FailureKind::Panic
                } else {
                    FailureKind::Error
                };
                failures.push(TaskFailure::new("<worker>", err.to_string(), kind));
            }
        }

        let report = failures.drain();

        tracing::info!(
            "Parallel run finished in {:?}: {} of {total} tasks failed",
            start.elapsed(),
            report.len()
        );

        report
    }
}

/// Run tasks one after another, stopping at the first failure.
///
/// Runs in the caller's own slot, so no limiter is involved.
///
/// # Errors
/// Returns the first task error unchanged, a [`RunnerError::Task`] for a panic,
/// or [`RunnerError::Cancelled`] if the handle fires between tasks.
pub async fn run_sequential(tasks: Vec<Task>, cancel: &CancelHandle) -> Result<()> {
    for task in tasks {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let name = task.name().to_owned();
        tracing::debug!("Running '{name}'");
        let handle = cancel.clone();
        match AssertUnwindSafe(async move { task.start(handle).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!("Task '{name}' failed: {err}");
                return Err(err);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!("Task '{name}' panicked: {message}");
                return Err(RunnerError::Task(message));
            }
        }
    }
    Ok(())
}

/// Worker body for a single task: wait for a slot, run, record any failure.
async fn run_one(
    task: Task,
    limiter: ConcurrencyLimiter,
    cancel: CancelHandle,
    failures: FailureLog,
) {
    let name = task.name().to_owned();

    let failure = match limiter.acquire().await {
        Err(err) => Some(TaskFailure::new(&name, err.to_string(), FailureKind::Error)),
        Ok(permit) => {
            let outcome = AssertUnwindSafe(async move { task.start(cancel).await })
                .catch_unwind()
                .await;
            drop(permit);

            match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(TaskFailure::new(&name, err.to_string(), FailureKind::Error)),
                Err(payload) => Some(TaskFailure::new(
                    &name,
                    panic_message(payload.as_ref()),
                    FailureKind::Panic,
                )),
            }
        }
    };

    if let Some(failure) = failure {
        tracing::warn!("Task '{}' failed: {}", failure.task, failure.message);
        failures.push(failure);
    }
}

/// Render a panic payload as text.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked with a non-string payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn explode(message: &str) -> Result<()> {
        panic!("{message}");
    }

    fn runner(capacity: usize) -> ParallelRunner {
        ParallelRunner::new(ConcurrencyLimiter::new(capacity))
    }

    #[tokio::test]
    async fn test_zero_tasks_succeed() {
        let result = runner(2).run_background(Vec::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_all_tasks_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks = (0..10)
            .map(|index| {
                let counter = Arc::clone(&counter);
                Task::new(format!("task-{index}"), move |_cancel| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        runner(3).run_background(tasks).await.expect("all succeed");
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_failure_message_is_preserved() {
        let tasks = vec![
            Task::new("good", |_cancel| async { Ok(()) }),
            Task::new("bad", |_cancel| async {
                Err(RunnerError::Task("it broke".to_owned()))
            }),
        ];

        let error = runner(1).run_background(tasks).await.unwrap_err();
        assert_eq!(error.to_string(), "it broke");
        assert_eq!(error.failures().len(), 1);
        assert_eq!(error.failures()[0].task, "bad");
        assert_eq!(error.failures()[0].kind, FailureKind::Error);
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let tasks = vec![Task::new("panics", |_cancel| async { explode("kaboom") })];

        let report = runner(1)
            .run_report(tasks, &CancelHandle::background())
            .await;
        assert_eq!(report.len(), 1);
        assert_eq!(report.failures()[0].kind, FailureKind::Panic);
        assert_eq!(report.failures()[0].message, "kaboom");
    }

    #[tokio::test]
    async fn test_permit_released_after_panic() {
        let limiter = ConcurrencyLimiter::new(1);
        let parallel = ParallelRunner::new(limiter.clone());
        let tasks = vec![
            Task::new("first", |_cancel| async { explode("first panics") }),
            Task::new("second", |_cancel| async { Ok(()) }),
        ];

        let report = parallel.run_report(tasks, &CancelHandle::background()).await;
        assert_eq!(report.messages(), vec!["first panics"]);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_sequential_stops_at_first_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let make = |name: &str, fail: bool| {
            let counter = Arc::clone(&counter);
            Task::new(name, move |_cancel| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(RunnerError::Task("stop here".to_owned()))
                } else {
                    Ok(())
                }
            })
        };
        let tasks = vec![make("one", false), make("two", true), make("three", false)];

        let error = run_sequential(tasks, &CancelHandle::background())
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "stop here");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sequential_respects_cancellation() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let tasks = vec![Task::new("never", |_cancel| async { Ok(()) })];

        let result = run_sequential(tasks, &cancel).await;
        assert!(matches!(result, Err(RunnerError::Cancelled)));
    }

    #[test]
    fn test_panic_message_variants() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new("owned".to_owned());
        let other: Box<dyn Any + Send> = Box::new(42u32);

        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(
            panic_message(other.as_ref()),
            "task panicked with a non-string payload"
        );
    }
}
