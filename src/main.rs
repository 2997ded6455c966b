//! Stasis - main entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use stasis::cli::{
    Cli, Command, run_down_command, run_init_command, run_status_command, run_up_command,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Completion scripts go to stdout untouched
    if let Command::Completion(completion) = &cli.command {
        return completion.run();
    }

    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stasis=info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = cli.config()?;

    match cli.command {
        Command::Up => run_up_command(&config).await,
        Command::Down { remove_orphans } => run_down_command(&config, remove_orphans).await,
        Command::Status => run_status_command(&config).await,
        Command::Init { name } => run_init_command(&config, name),
        Command::Completion(_) => Ok(()),
    }
}
