//! Bounded parallel task execution for build automation.
//!
//! This crate provides:
//! - [`ParallelRunner`], which runs tasks with a fixed concurrency cap and reports
//!   every failure once all tasks have finished
//! - [`ConcurrencyLimiter`], the shared slot pool sized from configuration,
//!   `MAX_PARALLEL`, and an optional docker capacity hint
//! - [`ShellCommand`] for turning command lines into tasks
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

/// Cooperative cancellation handle.
pub mod cancel;
/// External capacity hints (docker).
pub mod capacity;
/// Shell commands as tasks.
pub mod command;
/// Runner configuration.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Failure list shared by parallel workers.
mod failure_log;
/// Shared concurrency limiter.
pub mod limiter;
/// Failure reports.
pub mod report;
/// Parallel and sequential runners.
pub mod runner;
/// The uniform task interface.
pub mod task;

pub use cancel::CancelHandle;
pub use capacity::{
    CapacityHint, CapacityProbe, DockerInfo, DockerProbe, FixedProbe, NoProbe, local_cpus,
};
pub use command::{CommandOutput, ShellCommand};
pub use config::{ENV_MAX_PARALLEL, RunnerConfig, env_or, parse_max_parallel};
pub use error::{Result, RunnerError};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use report::{ExecutionReport, FailureKind, TaskFailure};
pub use runner::{ParallelRunner, run_sequential};
pub use task::Task;
