//! Subcommand handlers.

use std::fs;
use std::io::{Write as _, stdout};
use std::path::Path;

use anyhow::{Context as _, Result};
use jobcap_core::{
    CancelHandle, CapacityHint, CapacityProbe as _, ConcurrencyLimiter, DockerProbe,
    ParallelRunner, RunnerConfig, ShellCommand, Task, local_cpus, run_sequential,
};
use serde::Serialize;
use tokio::signal::ctrl_c;
use tokio::task::spawn_blocking;

use crate::cli::RunnerArgs;

/// Resolved settings printed by `jobcap info`.
#[derive(Debug, Serialize)]
pub struct InfoReport {
    /// Concurrency cap that runs would use
    pub capacity: usize,
    /// Logical processors on this machine
    pub local_cpus: usize,
    /// Explicit override, if any
    pub max_parallel: Option<usize>,
    /// Whether docker is consulted
    pub probe_docker: bool,
    /// Hint reported by docker
    pub hint: Option<CapacityHint>,
    /// Why no hint is available, when probing was attempted
    pub probe_error: Option<String>,
}

/// Build the runner configuration. Precedence: flag > `MAX_PARALLEL` > file > default.
///
/// # Errors
/// Returns an error if the config file exists but cannot be loaded.
pub fn build_config(args: &RunnerArgs) -> Result<RunnerConfig> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunnerConfig::load_or_default()?,
    }
    .with_env_overrides();

    if let Some(max_parallel) = args.max_parallel {
        config.max_parallel = Some(usize::try_from(max_parallel)?);
    }
    if args.no_docker {
        config.probe_docker = false;
    }
    Ok(config)
}

/// Parse command lines from a file: blank lines and `#` comments are skipped.
pub fn parse_command_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Gather command lines from the file (first) and the positional arguments.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn collect_commands(inline: Vec<String>, file: Option<&Path>) -> Result<Vec<String>> {
    let mut commands = Vec::new();
    if let Some(path) = file {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read command file {}", path.display()))?;
        commands.extend(parse_command_file(&contents));
    }
    commands.extend(inline);
    Ok(commands)
}

fn to_tasks(commands: Vec<String>) -> Vec<Task> {
    commands
        .into_iter()
        .map(|line| ShellCommand::shell(line).into_task())
        .collect()
}

/// Cancel the returned handle when Ctrl-C is received.
fn cancel_on_interrupt() -> CancelHandle {
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling running commands");
            trigger.cancel();
        }
    });
    cancel
}

/// Handle `jobcap run`.
///
/// # Errors
/// Returns the aggregated failure of every command that did not succeed.
pub async fn handle_run(
    args: &RunnerArgs,
    file: Option<&Path>,
    commands: Vec<String>,
) -> Result<()> {
    let config = build_config(args)?;
    let commands = collect_commands(commands, file)?;
    let limiter = ConcurrencyLimiter::from_config_async(config, DockerProbe::new()).await?;
    let runner = ParallelRunner::new(limiter);

    tracing::info!("Running {} commands", commands.len());
    runner.run(to_tasks(commands), &cancel_on_interrupt()).await?;
    Ok(())
}

/// Handle `jobcap seq`.
///
/// # Errors
/// Returns the first failing command's error.
pub async fn handle_seq(
    args: &RunnerArgs,
    file: Option<&Path>,
    commands: Vec<String>,
) -> Result<()> {
    // Loaded only to report a broken config file; sequential runs need no limiter.
    build_config(args)?;
    let commands = collect_commands(commands, file)?;

    run_sequential(to_tasks(commands), &cancel_on_interrupt()).await?;
    Ok(())
}

/// Resolve the settings `run` would use.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded.
pub fn info_report(args: &RunnerArgs) -> Result<InfoReport> {
    let config = build_config(args)?;
    let (hint, probe_error) = if config.wants_hint() {
        match DockerProbe::new().probe() {
            Ok(hint) => (Some(hint), None),
            Err(err) => (None, Some(err.to_string())),
        }
    } else {
        (None, None)
    };

    Ok(InfoReport {
        capacity: config.resolve_capacity(hint),
        local_cpus: local_cpus(),
        max_parallel: config.max_parallel,
        probe_docker: config.probe_docker,
        hint,
        probe_error,
    })
}

/// Handle `jobcap info`. The docker probe runs on the blocking pool.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or stdout is closed.
pub async fn handle_info(args: RunnerArgs) -> Result<()> {
    let report = spawn_blocking(move || info_report(&args))
        .await
        .context("Capacity probe did not complete")??;
    let mut out = stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
