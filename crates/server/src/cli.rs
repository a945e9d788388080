use clap::{Parser, Subcommand};

/// Exploit ingestion service.
///
/// Seeds storage from the bulk historical dataset when empty, then polls the
/// configured live provider on a fixed interval.
#[derive(Parser, Debug)]
#[command(name = "hackwatch", version, about = "Exploit ingestion service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run migrations, seed if empty, poll the live provider and serve the status probe
    Serve,
    /// Run the bulk seed once and exit
    Seed {
        /// Load the bulk dataset even when storage already has records
        #[arg(long)]
        force: bool,
    },
    /// Run a single live ingestion cycle and print its report
    PollOnce,
    /// Apply database migrations and exit
    Migrate,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
