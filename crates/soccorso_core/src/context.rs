//! Hosting shell for one context.
//!
//! A [`SyncContext`] is what a tab, window or CLI process owns: one
//! [`StateContainer`], one [`SyncMiddleware`] wired to the shared store and
//! channel, and the startup load already performed. UI collaborators only
//! use the methods here and never touch storage or the channel directly.

use std::sync::Arc;

use crate::channel::{CrossContextChannel, Transport};
use crate::config::SyncConfig;
use crate::container::{StateCallback, StateContainer};
use crate::middleware::{DispatchOutcome, SyncMiddleware, SyncStats};
use crate::registry::SubscriptionId;
use crate::state::{Action, ActionKind, SharedState};
use crate::storage::{DurableStore, KeyValueStore};

/// One context: container, middleware and the state restored at startup.
#[derive(Debug)]
pub struct SyncContext {
    middleware: SyncMiddleware,
    restored: Option<SharedState>,
}

impl SyncContext {
    /// Build the context and restore persisted state.
    ///
    /// `transport` must be bound to `config.channel_name`; a mismatch is
    /// logged since such a context would never see its peers.
    pub fn start(
        config: &SyncConfig,
        kv: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        if transport.name() != config.channel_name {
            log::warn!(
                "transport is bound to '{}' but config expects '{}'",
                transport.name(),
                config.channel_name
            );
        }

        let middleware = SyncMiddleware::new(
            Arc::new(StateContainer::default()),
            DurableStore::new(kv, config.store_key.clone()),
            CrossContextChannel::new(transport),
            config.replay_policy,
        );
        let restored = middleware.load_persisted();

        Self {
            middleware,
            restored,
        }
    }

    /// Dispatch any action through the sync policy.
    pub fn dispatch(&self, action: impl Into<Action>) -> DispatchOutcome {
        self.middleware.dispatch(action)
    }

    /// Select a region and share it with other contexts.
    pub fn set_region(&self, region: impl Into<String>) -> DispatchOutcome {
        self.dispatch(Action::set_region(region, true))
    }

    /// Select a dispatch center and share it with other contexts.
    pub fn set_dispatch_center(&self, center: impl Into<String>) -> DispatchOutcome {
        self.dispatch(Action::set_dispatch_center(center, true))
    }

    /// Clear the dispatch center and share the change.
    pub fn clear_dispatch_center(&self) -> DispatchOutcome {
        self.dispatch(Action::shared(ActionKind::SetDispatchCenter(None)))
    }

    /// Clear both selections and share the change.
    pub fn reset(&self) -> DispatchOutcome {
        self.dispatch(Action::reset(true))
    }

    /// Current state.
    pub fn get_state(&self) -> SharedState {
        self.middleware.get_state()
    }

    /// Register a UI callback run after every committed change.
    pub fn subscribe(&self, callback: StateCallback) -> SubscriptionId {
        self.middleware.container().subscribe(callback)
    }

    /// Remove a UI callback.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.middleware.container().unsubscribe(id)
    }

    /// State restored from storage at startup, if there was any.
    pub fn restored(&self) -> Option<&SharedState> {
        self.restored.as_ref()
    }

    /// Counters of the underlying middleware.
    pub fn stats(&self) -> SyncStats {
        self.middleware.stats()
    }

    /// Detach from the channel. Local dispatch and persistence keep working.
    pub fn close(&self) {
        self.middleware.close();
    }
}
