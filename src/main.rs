//! Kiln command-line entry point.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use kiln::cli::{Cli, Commands, build::build_project, graph::print_graph};
use kiln::config::KilnConfig;
use kiln::core::{AbortSignal, setup_abort_handler};

#[tokio::main]
async fn main() -> Result<()> {
    // Ctrl+C flips the signal; cooks stop at their next phase boundary
    let signal = AbortSignal::new();
    setup_abort_handler(signal.clone())?;

    let cli = Cli::parse();

    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = KilnConfig::load(&cli)?;

    match &cli.command {
        Commands::Build { .. } => build_project(&config, signal).await,
        Commands::Graph { args } => print_graph(&config, args.json, signal).await,
    }
}
