//! The per-context state container.
//!
//! [`StateContainer`] owns the canonical in-memory [`SharedState`] of one
//! context. It applies actions through [`reduce`](crate::state::reduce) and
//! notifies subscribers after every committed change. It knows nothing about
//! persistence or broadcasting; that is the job of
//! [`SyncMiddleware`](crate::middleware::SyncMiddleware).

use std::sync::{Arc, RwLock};

use crate::registry::{CallbackRegistry, SubscriptionId};
use crate::state::{ActionKind, SharedState, reduce};

/// Callback invoked with the new state after a committed change.
pub type StateCallback = Arc<dyn Fn(&SharedState) + Send + Sync>;

/// The state before and after applying one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State before the action.
    pub prev: SharedState,
    /// State after the action.
    pub next: SharedState,
}

impl Transition {
    /// Whether the action changed anything.
    pub fn changed(&self) -> bool {
        self.prev != self.next
    }
}

/// Holds the canonical state of one context.
#[derive(Debug, Default)]
pub struct StateContainer {
    state: RwLock<SharedState>,
    subscribers: CallbackRegistry<SharedState>,
}

impl StateContainer {
    /// Create a container seeded with `initial`.
    pub fn new(initial: SharedState) -> Self {
        Self {
            state: RwLock::new(initial),
            subscribers: CallbackRegistry::new(),
        }
    }

    /// Apply an action, commit the result and notify subscribers.
    ///
    /// Subscribers run after the commit, outside the state lock, and only if
    /// the state actually changed.
    pub fn dispatch(&self, kind: &ActionKind) -> Transition {
        let transition = self.apply(kind);
        if transition.changed() {
            self.notify();
        }
        transition
    }

    /// Apply an action and commit the result without notifying anyone.
    ///
    /// Callers that run side effects after the commit call
    /// [`notify`](Self::notify) once those are done.
    pub fn apply(&self, kind: &ActionKind) -> Transition {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let prev = state.clone();
        let next = reduce(&prev, kind);
        *state = next.clone();
        Transition { prev, next }
    }

    /// Run every subscriber with the state as it is now.
    pub fn notify(&self) {
        let current = self.get_state();
        self.subscribers.emit(&current);
    }

    /// Current state.
    pub fn get_state(&self) -> SharedState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Register a callback run after every committed change.
    pub fn subscribe(&self, callback: StateCallback) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    /// Remove a callback registered with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_commits_and_reports_transition() {
        let container = StateContainer::default();
        let transition = container.dispatch(&ActionKind::SetRegion(Some("veneto".into())));

        assert!(transition.changed());
        assert_eq!(transition.prev, SharedState::default());
        assert_eq!(container.get_state(), SharedState::new(Some("veneto"), None));
    }

    #[test]
    fn test_subscribers_only_see_changes() {
        let container = StateContainer::new(SharedState::new(Some("lazio"), None));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        container.subscribe(Arc::new(move |state| {
            seen_clone.lock().unwrap().push(state.clone());
        }));

        container.dispatch(&ActionKind::SetRegion(Some("lazio".into())));
        container.dispatch(&ActionKind::SetDispatchCenter(Some("NORD".into())));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], SharedState::new(Some("lazio"), Some("NORD")));
    }

    #[test]
    fn test_subscriber_may_read_state() {
        let container = Arc::new(StateContainer::default());
        let observed = Arc::new(Mutex::new(None));

        let container_clone = Arc::clone(&container);
        let observed_clone = Arc::clone(&observed);
        container.subscribe(Arc::new(move |_| {
            *observed_clone.lock().unwrap() = Some(container_clone.get_state());
        }));

        container.dispatch(&ActionKind::Reset);
        assert!(observed.lock().unwrap().is_none());

        container.dispatch(&ActionKind::SetRegion(Some("toscana".into())));
        assert_eq!(
            observed.lock().unwrap().clone(),
            Some(SharedState::new(Some("toscana"), None))
        );
    }

    #[test]
    fn test_apply_does_not_notify() {
        let container = StateContainer::default();
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = Arc::clone(&calls);
        container.subscribe(Arc::new(move |_| *calls_clone.lock().unwrap() += 1));

        let transition = container.apply(&ActionKind::SetRegion(Some("veneto".into())));
        assert!(transition.changed());
        assert_eq!(*calls.lock().unwrap(), 0);

        container.notify();
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let container = StateContainer::default();
        let id = container.subscribe(Arc::new(|_| {}));
        assert_eq!(container.subscriber_count(), 1);
        assert!(container.unsubscribe(id));
        assert_eq!(container.subscriber_count(), 0);
    }
}
