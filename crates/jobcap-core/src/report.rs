//! Failure collection for a single parallel run.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RunnerError};

/// How a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The task returned an error
    Error,
    /// The task panicked
    Panic,
}

/// A single failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Name of the task that failed
    pub task: String,
    /// Failure description
    pub message: String,
    /// Whether the failure was a returned error or a panic
    pub kind: FailureKind,
}

impl TaskFailure {
    /// Create a new failure record.
    pub fn new(task: impl Into<String>, message: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            task: task.into(),
            message: message.into(),
            kind,
        }
    }
}

/// Failures gathered from one run. An empty report means every task succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    failures: Vec<TaskFailure>,
}

impl ExecutionReport {
    /// Add a failure to the report.
    pub fn record(&mut self, failure: TaskFailure) {
        self.failures.push(failure);
    }

    /// True when no task failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Recorded failures, in completion order.
    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }

    /// Failure messages, in completion order.
    pub fn messages(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|failure| failure.message.as_str())
            .collect()
    }

    /// Convert into `Ok(())` when empty, otherwise an aggregate error.
    ///
    /// # Errors
    /// Returns [`RunnerError::Aggregate`] carrying this report if any task failed.
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(RunnerError::Aggregate(self))
        }
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("\n"))
    }
}

impl FromIterator<TaskFailure> for ExecutionReport {
    fn from_iter<I: IntoIterator<Item = TaskFailure>>(iter: I) -> Self {
        Self {
            failures: iter.into_iter().collect(),
        }
    }
}
