use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "soccorso")]
#[command(version)]
#[command(about = "Inspect and drive the shared region/dispatch-center selection", long_about = None)]
pub struct Cli {
    /// Override the config file location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the storage directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the persisted shared state as JSON
    Show,

    /// Select a region
    #[command(alias = "region")]
    SetRegion {
        /// Region identifier (e.g. "veneto")
        id: String,
    },

    /// Select a dispatch center
    #[command(alias = "center")]
    SetCenter {
        /// Dispatch center identifier (e.g. "SRL")
        id: String,
    },

    /// Clear the dispatch center selection
    ClearCenter,

    /// Clear both selections
    Reset,

    /// Run several in-process contexts against one store and channel
    Simulate {
        /// Number of contexts to open
        #[arg(short = 'n', long, default_value_t = 3)]
        contexts: usize,

        /// Use an in-memory store instead of the storage directory
        #[arg(long)]
        in_memory: bool,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file path
    Path,

    /// Write the effective configuration to the config file
    Init,
}
