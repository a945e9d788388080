mod cli;
mod logging;
mod router;
mod startup;

use clap::Parser;
use tracing::error;

use hackwatch_core::config::{load_dotenv, LogFormat};
use hackwatch_core::Config;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    load_dotenv();

    let config = Config::from_env();
    logging::init(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or(LogFormat::Pretty),
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    config.log_summary();

    let result = match cli.command() {
        Command::Serve => startup::serve(&config).await,
        Command::Seed { force } => startup::seed(&config, force).await,
        Command::PollOnce => startup::poll_once(&config).await,
        Command::Migrate => startup::migrate(&config).await,
    };

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "hackwatch exited with error");
    }
    result
}
