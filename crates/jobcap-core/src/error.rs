//! Error types for task execution and runner setup.

use core::result::Result as CoreResult;
use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

use crate::report::{ExecutionReport, TaskFailure};

/// Result type for runner operations.
pub type Result<T> = CoreResult<T, RunnerError>;

/// Errors that can occur while configuring the runner or executing tasks.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or could not be persisted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A task reported a failure.
    #[error("{0}")]
    Task(String),

    /// A shell command exited unsuccessfully.
    #[error("command `{command}` failed with exit code {code}: {stderr}")]
    Command {
        /// The command line that was run
        command: String,
        /// Exit code, or -1 when terminated by a signal
        code: i32,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// The capacity probe could not produce a hint.
    #[error("Capacity probe failed: {0}")]
    Probe(String),

    /// Work was abandoned because the cancellation handle fired.
    #[error("cancelled")]
    Cancelled,

    /// One or more tasks in a parallel run failed.
    #[error("{0}")]
    Aggregate(ExecutionReport),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl RunnerError {
    /// Returns true when this error combines the failures of a parallel run.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(_))
    }

    /// The individual task failures carried by an aggregate error.
    ///
    /// Any other variant yields an empty slice.
    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            Self::Aggregate(report) => report.failures(),
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::FailureKind;
    use serde_json::{Value as JsonValue, from_str};
    use std::io;

    #[test]
    fn test_error_display() {
        let error1 = RunnerError::Config("bad value".to_owned());
        assert_eq!(error1.to_string(), "Configuration error: bad value");

        let error2 = RunnerError::Task("boom".to_owned());
        assert_eq!(error2.to_string(), "boom");

        let error3 = RunnerError::Command {
            command: "false".to_owned(),
            code: 1,
            stderr: String::new(),
        };
        assert_eq!(error3.to_string(), "command `false` failed with exit code 1: ");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing");
        let error: RunnerError = io_error.into();
        assert!(matches!(error, RunnerError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_error = from_str::<JsonValue>("not json").unwrap_err();
        let error: RunnerError = json_error.into();
        assert!(matches!(error, RunnerError::Json(_)));
    }

    #[test]
    fn test_aggregate_exposes_failures() {
        let mut report = ExecutionReport::default();
        report.record(TaskFailure::new("a", "first", FailureKind::Error));
        report.record(TaskFailure::new("b", "second", FailureKind::Panic));

        let error = RunnerError::Aggregate(report);
        assert!(error.is_aggregate());
        assert_eq!(error.failures().len(), 2);
        assert_eq!(error.to_string(), "first\nsecond");

        assert!(RunnerError::Cancelled.failures().is_empty());
        assert!(!RunnerError::Cancelled.is_aggregate());
    }
}
