//! Callback registry for change subscriptions.
//!
//! This module provides a thread-safe registry for managing callbacks. It is
//! used by the [`StateContainer`](crate::container::StateContainer) to notify
//! UI bindings of committed changes and by the
//! [`CrossContextChannel`](crate::channel::CrossContextChannel) to fan decoded
//! sync messages out to listeners.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback function type.
///
/// Callbacks receive a reference to the event and should not block for extended periods.
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Thread-safe registry for managing subscriptions.
///
/// # Example
///
/// ```
/// use soccorso_core::registry::CallbackRegistry;
/// use std::sync::Arc;
///
/// let registry: CallbackRegistry<String> = CallbackRegistry::new();
/// let id = registry.subscribe(Arc::new(|event| println!("Event: {event}")));
/// registry.emit(&"hello".to_string());
/// assert!(registry.unsubscribe(id));
/// ```
pub struct CallbackRegistry<E> {
    /// Callbacks in subscription order.
    callbacks: RwLock<BTreeMap<SubscriptionId, Callback<E>>>,
    /// Counter for generating unique subscription IDs.
    next_id: AtomicU64,
}

impl<E> CallbackRegistry<E> {
    /// Create a new empty callback registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback.
    ///
    /// Returns a subscription ID that can be used to unsubscribe later.
    pub fn subscribe(&self, callback: Callback<E>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        callbacks.insert(id, callback);
        id
    }

    /// Remove a callback.
    ///
    /// Returns `true` if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        callbacks.remove(&id).is_some()
    }

    /// Emit an event to all registered callbacks, in subscription order.
    ///
    /// The lock is released before any callback runs, so callbacks may
    /// subscribe, unsubscribe or trigger further emits. A panicking callback
    /// does not prevent the others from running.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = {
            let callbacks = self.callbacks.read().unwrap_or_else(|e| e.into_inner());
            callbacks.values().cloned().collect()
        };
        for callback in snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
            if result.is_err() {
                log::warn!("subscriber callback panicked; continuing with remaining subscribers");
            }
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let callbacks = self.callbacks.read().unwrap_or_else(|e| e.into_inner());
        callbacks.len()
    }

    /// Check if there are any active subscriptions.
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Clear all subscriptions.
    pub fn clear(&self) {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        callbacks.clear();
    }
}

impl<E> Default for CallbackRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for CallbackRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscriber_count", &self.subscriber_count())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}
