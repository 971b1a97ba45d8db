//! Single-context commands.
//!
//! Each invocation is one short-lived context over the file-backed store.
//! There are no live peers in this process, so the broadcast goes nowhere;
//! other processes pick the change up from storage when they start.

use std::sync::Arc;

use soccorso_core::channel::ChannelHub;
use soccorso_core::config::SyncConfig;
use soccorso_core::middleware::DispatchOutcome;
use soccorso_core::state::SharedState;
use soccorso_core::storage::FileKeyValueStore;
use soccorso_core::SyncContext;

use super::data_dir;

fn open_context(config: &SyncConfig) -> Option<SyncContext> {
    let dir = data_dir(config)?;
    let hub = ChannelHub::new();
    Some(SyncContext::start(
        config,
        Arc::new(FileKeyValueStore::new(dir)),
        Arc::new(hub.open(&config.channel_name)),
    ))
}

fn print_state(state: &SharedState) -> bool {
    match serde_json::to_string_pretty(state) {
        Ok(json) => {
            println!("{}", json);
            true
        }
        Err(e) => {
            eprintln!("✗ Could not render state: {}", e);
            false
        }
    }
}

fn report(ctx: &SyncContext, outcome: DispatchOutcome) -> bool {
    if !outcome.changed() {
        log::info!("state already up to date");
    } else if !outcome.persisted {
        eprintln!("✗ State changed but could not be written to storage");
        print_state(&ctx.get_state());
        return false;
    }
    print_state(&ctx.get_state())
}

/// Print the state a freshly started context restores.
///
/// Starting a context only reads storage, so this never writes.
pub fn handle_show(config: &SyncConfig) -> bool {
    let Some(ctx) = open_context(config) else {
        return false;
    };
    if ctx.restored().is_none() {
        log::info!("no usable state under '{}'", config.store_key);
    }
    print_state(&ctx.get_state())
}

pub fn handle_set_region(config: &SyncConfig, id: &str) -> bool {
    let Some(ctx) = open_context(config) else {
        return false;
    };
    let outcome = ctx.set_region(id);
    report(&ctx, outcome)
}

pub fn handle_set_center(config: &SyncConfig, id: &str) -> bool {
    let Some(ctx) = open_context(config) else {
        return false;
    };
    if !ctx.get_state().has_region() {
        log::warn!("selecting dispatch center '{}' with no region selected", id);
    }
    let outcome = ctx.set_dispatch_center(id);
    report(&ctx, outcome)
}

pub fn handle_clear_center(config: &SyncConfig) -> bool {
    let Some(ctx) = open_context(config) else {
        return false;
    };
    let outcome = ctx.clear_dispatch_center();
    report(&ctx, outcome)
}

pub fn handle_reset(config: &SyncConfig) -> bool {
    let Some(ctx) = open_context(config) else {
        return false;
    };
    let outcome = ctx.reset();
    report(&ctx, outcome)
}
