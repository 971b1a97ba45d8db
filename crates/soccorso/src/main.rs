//! Command-line host for the Soccorso shared-state engine.

/// CLI module - command-line interface for soccorso
mod cli;

fn main() {
    cli::run_cli();
}
