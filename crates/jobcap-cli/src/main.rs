//! jobcap - run build commands with a bounded number of parallel jobs

use anyhow::Result;
use clap::Parser as _;
use jobcap_cli::cli::{Cli, Commands};
use jobcap_cli::handlers;
use std::io::stderr;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobcap_core=info,jobcap_cli=info".into()),
        )
        .with(fmt::layer().with_writer(stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            runner,
            file,
            commands,
        } => handlers::handle_run(&runner, file.as_deref(), commands).await?,
        Commands::Seq {
            runner,
            file,
            commands,
        } => handlers::handle_seq(&runner, file.as_deref(), commands).await?,
        Commands::Info { runner } => handlers::handle_info(runner).await?,
    }

    Ok(())
}
