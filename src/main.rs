//! Main entry point for the statediff CLI

use clap::Parser;
use statediff::cli::Cli;
use statediff::commands::execute_command;

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level())
        .init();

    if let Err(e) = execute_command(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
