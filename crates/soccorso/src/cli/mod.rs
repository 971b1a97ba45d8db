/// Clap argument definitions
mod args;

/// Config command handlers
mod config;

/// `simulate` command: several contexts in one process
mod simulate;

/// `show`, `set-region`, `set-center`, `clear-center`, `reset`
mod state;

use clap::Parser;
use std::path::PathBuf;

use soccorso_core::config::SyncConfig;

pub use args::Cli;
use args::Commands;

/// Main entry point for the CLI
pub fn run_cli() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config.clone() {
        Some(path) => Some(path),
        None => match SyncConfig::default_path() {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        },
    };
    let mut config = config_path
        .as_deref()
        .map(SyncConfig::load_or_default)
        .unwrap_or_default();
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    let success = match cli.command {
        Commands::Show => state::handle_show(&config),
        Commands::SetRegion { id } => state::handle_set_region(&config, &id),
        Commands::SetCenter { id } => state::handle_set_center(&config, &id),
        Commands::ClearCenter => state::handle_clear_center(&config),
        Commands::Reset => state::handle_reset(&config),
        Commands::Simulate {
            contexts,
            in_memory,
        } => simulate::handle_simulate(&config, contexts, in_memory),
        Commands::Config { command } => {
            config::handle_config_command(command, &config, config_path.as_ref())
        }
    };

    if !success {
        std::process::exit(1);
    }
}

/// Resolve the storage directory or report why it can't be found.
fn data_dir(config: &SyncConfig) -> Option<PathBuf> {
    match config.resolve_data_dir() {
        Ok(dir) => Some(dir),
        Err(e) => {
            eprintln!("✗ {}", e);
            None
        }
    }
}
