//! The uniform unit of work accepted by the runner.

use core::fmt;
use core::future::Future;
use std::panic::resume_unwind;

use futures::FutureExt as _;
use futures::future::BoxFuture;
use tokio::task::spawn_blocking;

use crate::cancel::CancelHandle;
use crate::error::{Result, RunnerError};

/// Boxed task body: consumes the cancellation handle and yields the task future.
type TaskBody = Box<dyn FnOnce(CancelHandle) -> BoxFuture<'static, Result<()>> + Send>;

/// A named, fallible unit of work.
pub struct Task {
    name: String,
    body: TaskBody,
}

impl Task {
    /// Create a task from an async body.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancelHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(move |cancel| body(cancel).boxed()),
        }
    }

    /// Create a task from a synchronous body that runs on the blocking thread pool.
    ///
    /// A panic inside the body is re-raised on the runner side so it is reported
    /// like a panic in an async task.
    pub fn blocking<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancelHandle) -> Result<()> + Send + 'static,
    {
        Self::new(name, move |cancel| async move {
            match spawn_blocking(move || body(cancel)).await {
                Ok(result) => result,
                Err(join_error) if join_error.is_panic() => {
                    resume_unwind(join_error.into_panic())
                }
                Err(join_error) => Err(RunnerError::Other(format!(
                    "blocking task did not complete: {join_error}"
                ))),
            }
        })
    }

    /// The task's name, used in logs and failure records.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the body, producing the future to poll.
    pub(crate) fn start(self, cancel: CancelHandle) -> BoxFuture<'static, Result<()>> {
        (self.body)(cancel)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
