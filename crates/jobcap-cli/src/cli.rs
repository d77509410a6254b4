//! Command-line arguments for the `jobcap` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Run build commands with a bounded number of parallel jobs
#[derive(Parser, Debug)]
#[command(name = "jobcap", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand that sizes the limiter.
#[derive(Args, Debug, Clone, Default)]
pub struct RunnerArgs {
    /// Maximum number of commands running at once (overrides MAX_PARALLEL)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel: Option<u64>,

    /// Do not ask the docker daemon for its CPU count
    #[arg(long)]
    pub no_docker: bool,

    /// Config file to load instead of ~/.jobcap/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run command lines in parallel and report every failure at the end
    Run {
        /// Limiter options
        #[command(flatten)]
        runner: RunnerArgs,

        /// Read additional command lines from a file (one per line, `#` comments)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Command lines, each run through `sh -c`
        commands: Vec<String>,
    },

    /// Run command lines one at a time, stopping at the first failure
    Seq {
        /// Limiter options
        #[command(flatten)]
        runner: RunnerArgs,

        /// Read additional command lines from a file (one per line, `#` comments)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Command lines, each run through `sh -c`
        commands: Vec<String>,
    },

    /// Print the resolved concurrency settings as JSON
    Info {
        /// Limiter options
        #[command(flatten)]
        runner: RunnerArgs,
    },
}
