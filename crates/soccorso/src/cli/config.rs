use std::path::PathBuf;

use soccorso_core::config::SyncConfig;

use super::args::ConfigCommands;

/// Handle `config` subcommands
pub fn handle_config_command(
    command: Option<ConfigCommands>,
    config: &SyncConfig,
    config_path: Option<&PathBuf>,
) -> bool {
    match command.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => match toml::to_string_pretty(config) {
            Ok(contents) => {
                print!("{}", contents);
                true
            }
            Err(e) => {
                eprintln!("✗ Could not render config: {}", e);
                false
            }
        },
        ConfigCommands::Path => match config_path {
            Some(path) => {
                println!("{}", path.display());
                true
            }
            None => {
                eprintln!("✗ Could not determine config directory");
                false
            }
        },
        ConfigCommands::Init => {
            let Some(path) = config_path else {
                eprintln!("✗ Could not determine config directory");
                return false;
            };
            if path.exists() {
                eprintln!("✗ Config already exists at {}", path.display());
                return false;
            }
            match config.save_to(path) {
                Ok(()) => {
                    println!("✓ Wrote {}", path.display());
                    true
                }
                Err(e) => {
                    eprintln!("✗ {}", e);
                    false
                }
            }
        }
    }
}
