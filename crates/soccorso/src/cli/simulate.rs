//! `simulate`: open several contexts in one process and watch them converge.

use std::sync::Arc;

use serde::Serialize;
use soccorso_core::channel::ChannelHub;
use soccorso_core::config::SyncConfig;
use soccorso_core::middleware::{DispatchOutcome, SyncStats};
use soccorso_core::state::{Action, SharedState};
use soccorso_core::storage::{DurableStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use soccorso_core::SyncContext;

use super::data_dir;

/// One scripted step: which context acts, and what it does.
struct Step {
    context: usize,
    label: &'static str,
    action: Action,
}

fn script(contexts: usize) -> Vec<Step> {
    let last = contexts - 1;
    vec![
        Step {
            context: 0,
            label: "select region veneto (shared)",
            action: Action::set_region("veneto", true),
        },
        Step {
            context: last,
            label: "select dispatch center SUEM (shared)",
            action: Action::set_dispatch_center("SUEM", true),
        },
        Step {
            context: 0,
            label: "select region veneto again (no-op)",
            action: Action::set_region("veneto", true),
        },
        Step {
            context: last / 2,
            label: "select region lazio (local only)",
            action: Action::set_region("lazio", false),
        },
        Step {
            context: last,
            label: "reset (shared)",
            action: Action::reset(true),
        },
    ]
}

#[derive(Serialize)]
struct StepReport<'a> {
    step: &'a str,
    context: usize,
    outcome: DispatchOutcome,
    states: Vec<SharedState>,
}

#[derive(Serialize)]
struct Summary {
    stored: Option<SharedState>,
    stats: Vec<SyncStats>,
}

/// Run the scripted exchange and print one JSON report per step.
pub fn handle_simulate(config: &SyncConfig, contexts: usize, in_memory: bool) -> bool {
    if contexts < 2 {
        eprintln!("✗ Need at least 2 contexts to simulate synchronization");
        return false;
    }

    let kv: Arc<dyn KeyValueStore> = if in_memory {
        Arc::new(MemoryKeyValueStore::new())
    } else {
        match data_dir(config) {
            Some(dir) => Arc::new(FileKeyValueStore::new(dir)),
            None => return false,
        }
    };

    let hub = ChannelHub::new();
    let ctxs: Vec<SyncContext> = (0..contexts)
        .map(|_| {
            SyncContext::start(
                config,
                Arc::clone(&kv),
                Arc::new(hub.open(&config.channel_name)),
            )
        })
        .collect();
    log::info!("opened {} contexts on channel '{}'", contexts, config.channel_name);

    for step in script(contexts) {
        let outcome = ctxs[step.context].dispatch(step.action);
        let report = StepReport {
            step: step.label,
            context: step.context,
            outcome,
            states: ctxs.iter().map(SyncContext::get_state).collect(),
        };
        if !print_json(&report) {
            return false;
        }
    }

    let stored = DurableStore::new(Arc::clone(&kv), config.store_key.clone()).load();
    let summary = Summary {
        stored,
        stats: ctxs.iter().map(SyncContext::stats).collect(),
    };
    print_json(&summary)
}

fn print_json<T: Serialize>(value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            true
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            false
        }
    }
}
