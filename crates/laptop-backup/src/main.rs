//! laptop-backup CLI
//!
//! Entry point for provisioning and inspecting the backup bucket of a project.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let overrides = cli.overrides();
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Deploy(args) => commands::deploy::run(args, config_path, overrides).await,
        Commands::Status(args) => commands::status::run(args, config_path, overrides).await,
        Commands::Destroy(args) => commands::destroy::run(args, config_path, overrides).await,
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // info shows each resource as it is converged
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
