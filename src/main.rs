// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Log level used when RUST_LOG is unset
fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 | 1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the bag status messages
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level(cli.verbose))),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fill { bag, args } => commands::cmd_fill(&bag, &args, cli.verbose),
        Commands::Complete { bag } => {
            let status = commands::cmd_complete(&bag, cli.verbose)?;
            std::process::exit(status)
        }
        Commands::Validate { bag } => {
            let status = commands::cmd_validate(&bag, cli.verbose)?;
            std::process::exit(status)
        }
    }
}
