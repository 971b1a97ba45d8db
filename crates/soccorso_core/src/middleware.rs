//! Synchronization middleware.
//!
//! [`SyncMiddleware`] sits between action dispatch and the
//! [`StateContainer`]. For every action it decides whether the result is
//! written to the [`DurableStore`] and whether it is broadcast on the
//! [`CrossContextChannel`]:
//!
//! 1. apply the action to the container, keeping the state before and after
//! 2. if nothing changed, stop (no write, no broadcast)
//! 3. if the action is a replay (`ApplyExternalState` / `LoadFromStorage`),
//!    stop, unless [`ReplayPolicy::Persist`] asks for a write; replays are
//!    never broadcast
//! 4. otherwise persist the new state, whatever `shareable` says
//! 5. if the action is shareable, publish a [`SyncMessage`] carrying it
//! 6. run the container's subscribers, so anything they dispatch is written
//!    and broadcast after this action
//!
//! Inbound messages are turned into `ApplyExternalState` actions, which by
//! rule 3 can't produce further messages. That is what keeps contexts from
//! echoing each other forever.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;

use crate::channel::{CrossContextChannel, SyncMessage};
use crate::config::ReplayPolicy;
use crate::container::StateContainer;
use crate::registry::SubscriptionId;
use crate::state::{Action, SharedState};
use crate::storage::DurableStore;

/// What became of one dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFate {
    /// The action left the state as it was.
    Unchanged,
    /// A replay changed the state; nothing was broadcast.
    Replayed,
    /// A local action changed the state; nothing was broadcast.
    LocalOnly,
    /// A shareable action changed the state and a sync message was published.
    Broadcast,
}

/// Result of [`SyncMiddleware::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    /// Where the action ended up.
    pub fate: ActionFate,
    /// Whether the new state reached the durable store.
    pub persisted: bool,
    /// Whether the transport accepted the sync message.
    pub delivered: bool,
}

impl DispatchOutcome {
    fn new(fate: ActionFate) -> Self {
        Self {
            fate,
            persisted: false,
            delivered: false,
        }
    }

    /// Whether the action changed the state.
    pub fn changed(&self) -> bool {
        self.fate != ActionFate::Unchanged
    }
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    unchanged: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
    broadcast: AtomicU64,
}

/// Counters for one context's middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Actions dispatched, including replays.
    pub dispatched: u64,
    /// Actions that changed nothing.
    pub unchanged: u64,
    /// Successful snapshot writes.
    pub persisted: u64,
    /// Snapshot writes that failed.
    pub persist_failures: u64,
    /// Sync messages accepted by the transport.
    pub broadcast: u64,
    /// Sync messages received from other contexts.
    pub received: u64,
    /// Inbound frames dropped as malformed.
    pub dropped: u64,
}

struct Inner {
    container: Arc<StateContainer>,
    store: DurableStore,
    channel: CrossContextChannel,
    policy: ReplayPolicy,
    counters: Counters,
}

impl Inner {
    fn dispatch(&self, action: &Action) -> DispatchOutcome {
        self.counters.dispatched.fetch_add(1, Ordering::SeqCst);
        let transition = self.container.apply(action.kind());

        if !transition.changed() {
            self.counters.unchanged.fetch_add(1, Ordering::SeqCst);
            log::debug!("{} left state unchanged", action.kind().name());
            return DispatchOutcome::new(ActionFate::Unchanged);
        }

        // Subscribers may dispatch again; they only run once this action's
        // own write and broadcast are out, so nested actions land after it.
        let outcome = self.propagate(action, transition.next);
        self.container.notify();
        outcome
    }

    fn propagate(&self, action: &Action, next: SharedState) -> DispatchOutcome {
        let kind = action.kind();
        if kind.is_replay() {
            let mut outcome = DispatchOutcome::new(ActionFate::Replayed);
            if self.policy == ReplayPolicy::Persist {
                outcome.persisted = self.persist(&next);
            }
            log::debug!("applied {} replay", kind.name());
            return outcome;
        }

        let persisted = self.persist(&next);
        if !action.is_shareable() {
            return DispatchOutcome {
                persisted,
                ..DispatchOutcome::new(ActionFate::LocalOnly)
            };
        }

        let message = SyncMessage::SyncStateFromOtherContext(next);
        let delivered = self.channel.publish(&message);
        if delivered {
            self.counters.broadcast.fetch_add(1, Ordering::SeqCst);
        }
        log::debug!("{} broadcast on '{}'", kind.name(), self.channel.name());
        DispatchOutcome {
            fate: ActionFate::Broadcast,
            persisted,
            delivered,
        }
    }

    fn persist(&self, state: &SharedState) -> bool {
        match self.store.save(state) {
            Ok(()) => {
                self.counters.persisted.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(e) => {
                self.counters.persist_failures.fetch_add(1, Ordering::SeqCst);
                log::warn!("state not persisted under '{}': {}", self.store.key(), e);
                false
            }
        }
    }
}

/// Coordinates one context's container, durable store and channel.
///
/// Construct exactly one per context: two instances on the same container
/// would each react to inbound messages and each broadcast local changes.
pub struct SyncMiddleware {
    inner: Arc<Inner>,
    subscription: SubscriptionId,
}

impl SyncMiddleware {
    /// Wire the middleware and subscribe to inbound sync messages.
    pub fn new(
        container: Arc<StateContainer>,
        store: DurableStore,
        channel: CrossContextChannel,
        policy: ReplayPolicy,
    ) -> Self {
        let inner = Arc::new(Inner {
            container,
            store,
            channel,
            policy,
            counters: Counters::default(),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let subscription = inner
            .channel
            .subscribe(Arc::new(move |message: &SyncMessage| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(&Action::apply_external(message.state().clone()));
                }
            }));

        Self {
            inner,
            subscription,
        }
    }

    /// Dispatch an action through the sync policy.
    pub fn dispatch(&self, action: impl Into<Action>) -> DispatchOutcome {
        self.inner.dispatch(&action.into())
    }

    /// Seed the container from the durable store.
    ///
    /// Run once, before the first user action. Returns the loaded state, if
    /// any. Loading never broadcasts.
    pub fn load_persisted(&self) -> Option<SharedState> {
        let state = self.inner.store.load()?;
        log::info!("restoring persisted state from '{}'", self.inner.store.key());
        self.inner.dispatch(&Action::load_from_storage(state.clone()));
        Some(state)
    }

    /// Current state of this context.
    pub fn get_state(&self) -> SharedState {
        self.inner.container.get_state()
    }

    /// The container this middleware drives.
    pub fn container(&self) -> &Arc<StateContainer> {
        &self.inner.container
    }

    /// The replay policy in effect.
    pub fn policy(&self) -> ReplayPolicy {
        self.inner.policy
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> SyncStats {
        let counters = &self.inner.counters;
        let channel = self.inner.channel.stats();
        SyncStats {
            dispatched: counters.dispatched.load(Ordering::SeqCst),
            unchanged: counters.unchanged.load(Ordering::SeqCst),
            persisted: counters.persisted.load(Ordering::SeqCst),
            persist_failures: counters.persist_failures.load(Ordering::SeqCst),
            broadcast: counters.broadcast.load(Ordering::SeqCst),
            received: channel.received,
            dropped: channel.dropped,
        }
    }

    /// Stop receiving messages and detach from the channel.
    pub fn close(&self) {
        self.inner.channel.unsubscribe(self.subscription);
        self.inner.channel.close();
    }
}

impl std::fmt::Debug for SyncMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMiddleware")
            .field("store", &self.inner.store)
            .field("channel", &self.inner.channel)
            .field("policy", &self.inner.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelHub, Transport};
    use crate::state::ActionKind;
    use crate::storage::{KeyValueStore, MemoryKeyValueStore};
    use std::sync::Mutex;

    const KEY: &str = "soccorso-state";
    const CHANNEL: &str = "soccorso-sync";

    fn middleware(hub: &ChannelHub, kv: &MemoryKeyValueStore, policy: ReplayPolicy) -> SyncMiddleware {
        SyncMiddleware::new(
            Arc::new(StateContainer::default()),
            DurableStore::new(Arc::new(kv.clone()), KEY),
            CrossContextChannel::new(Arc::new(hub.open(CHANNEL))),
            policy,
        )
    }

    /// A raw endpoint on the sync channel that records every frame.
    fn tap(hub: &ChannelHub) -> (impl Transport, Arc<Mutex<Vec<String>>>) {
        let endpoint = hub.open(CHANNEL);
        let frames = Arc::new(Mutex::new(Vec::new()));
        let frames_clone = Arc::clone(&frames);
        endpoint.set_listener(Some(Arc::new(move |frame: &str| {
            frames_clone.lock().unwrap().push(frame.to_string());
        })));
        (endpoint, frames)
    }

    #[test]
    fn test_shareable_change_is_persisted_and_broadcast() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (_tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);

        let outcome = sync.dispatch(Action::set_region("veneto", true));

        assert_eq!(outcome.fate, ActionFate::Broadcast);
        assert!(outcome.persisted);
        assert!(outcome.delivered);
        assert_eq!(frames.lock().unwrap().len(), 1);
        assert!(kv.get_item(KEY).unwrap().unwrap().contains("veneto"));
    }

    #[test]
    fn test_local_change_is_persisted_only() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (_tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);

        let outcome = sync.dispatch(Action::set_dispatch_center("SRL", false));

        assert_eq!(outcome.fate, ActionFate::LocalOnly);
        assert!(outcome.persisted);
        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(sync.stats().persisted, 1);
    }

    #[test]
    fn test_no_op_writes_nothing() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (_tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);

        sync.dispatch(Action::set_region("veneto", true));
        kv.remove_item(KEY).unwrap();

        let outcome = sync.dispatch(Action::set_region("veneto", true));
        assert_eq!(outcome.fate, ActionFate::Unchanged);
        assert_eq!(kv.get_item(KEY).unwrap(), None);
        assert_eq!(frames.lock().unwrap().len(), 1);
        assert_eq!(sync.stats().unchanged, 1);
    }

    #[test]
    fn test_replay_is_terminal_by_default() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (_tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);

        let outcome = sync.dispatch(ActionKind::ApplyExternalState(SharedState::new(
            Some("lazio"),
            None,
        )));

        assert_eq!(outcome.fate, ActionFate::Replayed);
        assert!(!outcome.persisted);
        assert!(kv.is_empty());
        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(sync.get_state(), SharedState::new(Some("lazio"), None));
    }

    #[test]
    fn test_persist_policy_writes_replays_but_never_broadcasts() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (_tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Persist);

        let outcome = sync.dispatch(Action::apply_external(SharedState::new(
            Some("lazio"),
            Some("NORD"),
        )));

        assert_eq!(outcome.fate, ActionFate::Replayed);
        assert!(outcome.persisted);
        assert!(kv.get_item(KEY).unwrap().unwrap().contains("NORD"));
        assert!(frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_storage_failure_does_not_block_broadcast() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (_tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);
        kv.set_available(false);

        let outcome = sync.dispatch(Action::set_region("piemonte", true));

        assert_eq!(outcome.fate, ActionFate::Broadcast);
        assert!(!outcome.persisted);
        assert!(outcome.delivered);
        assert_eq!(sync.get_state(), SharedState::new(Some("piemonte"), None));
        assert_eq!(frames.lock().unwrap().len(), 1);
        assert_eq!(sync.stats().persist_failures, 1);
    }

    #[test]
    fn test_closed_channel_keeps_local_state_and_persistence() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);
        sync.close();

        let outcome = sync.dispatch(Action::set_region("umbria", true));

        assert_eq!(outcome.fate, ActionFate::Broadcast);
        assert!(outcome.persisted);
        assert!(!outcome.delivered);
        assert_eq!(sync.stats().broadcast, 0);
        assert_eq!(hub.endpoint_count(CHANNEL), 0);
    }

    #[test]
    fn test_load_persisted_does_not_broadcast() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        DurableStore::new(Arc::new(kv.clone()), KEY)
            .save(&SharedState::new(Some("lazio"), Some("NORD")))
            .unwrap();
        let (_tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);

        let loaded = sync.load_persisted();

        assert_eq!(loaded, Some(SharedState::new(Some("lazio"), Some("NORD"))));
        assert_eq!(sync.get_state(), SharedState::new(Some("lazio"), Some("NORD")));
        assert!(frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_inbound_message_applies_without_echo() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (tap, frames) = tap(&hub);
        let sync = middleware(&hub, &kv, ReplayPolicy::Terminal);

        tap.post(r#"{"type":"SyncStateFromOtherContext","payload":{"selectedRegion":"marche","selectedDispatchCenter":null}}"#)
            .unwrap();

        assert_eq!(sync.get_state(), SharedState::new(Some("marche"), None));
        assert!(frames.lock().unwrap().is_empty());
        let stats = sync.stats();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.broadcast, 0);
        assert_eq!(stats.persisted, 0);
    }

    #[test]
    fn test_dropping_middleware_stops_inbound_handling() {
        let hub = ChannelHub::new();
        let kv = MemoryKeyValueStore::new();
        let (tap, _frames) = tap(&hub);
        let container = Arc::new(StateContainer::default());
        let sync = SyncMiddleware::new(
            Arc::clone(&container),
            DurableStore::new(Arc::new(kv.clone()), KEY),
            CrossContextChannel::new(Arc::new(hub.open(CHANNEL))),
            ReplayPolicy::Terminal,
        );
        drop(sync);

        tap.post(r#"{"type":"SyncStateFromOtherContext","payload":{"selectedRegion":"molise","selectedDispatchCenter":null}}"#)
            .unwrap();
        assert_eq!(container.get_state(), SharedState::default());
    }
}
