//! Cross-context broadcast channel.
//!
//! Contexts exchange [`SyncMessage`]s as JSON text frames over a named
//! [`Transport`]. Delivery is best-effort: there is no acknowledgement, no
//! ordering across contexts, and a context never receives its own frames.
//!
//! The envelope is `{"type": <string>, "payload": <object>}`. Other message
//! types may share the same transport; [`CrossContextChannel`] only decodes
//! the ones it knows and skips the rest.

mod hub;
pub use hub::{ChannelEndpoint, ChannelHub};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{Result, SoccorsoError};
use crate::registry::{CallbackRegistry, SubscriptionId};
use crate::state::SharedState;

/// Listener for raw text frames arriving on a transport.
pub type FrameListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Listener for decoded sync messages.
pub type MessageListener = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

/// A named, best-effort broadcast transport.
///
/// Implementations deliver each posted frame to every other open endpoint of
/// the same name and never back to the sender.
pub trait Transport: Send + Sync {
    /// Channel name this transport is bound to.
    fn name(&self) -> &str;

    /// Post a frame to the other endpoints.
    fn post(&self, frame: &str) -> Result<()>;

    /// Install (or remove, with `None`) the listener for inbound frames.
    fn set_listener(&self, listener: Option<FrameListener>);

    /// Detach from the channel. Other endpoints are unaffected.
    fn close(&self);
}

/// Messages carried on the sync channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    /// Replace the receiver's shared state with this one.
    SyncStateFromOtherContext(SharedState),
}

impl SyncMessage {
    /// Envelope `type` values understood by this channel.
    pub const KNOWN_TYPES: &'static [&'static str] = &["SyncStateFromOtherContext"];

    /// The state carried by the message.
    pub fn state(&self) -> &SharedState {
        match self {
            SyncMessage::SyncStateFromOtherContext(state) => state,
        }
    }
}

/// Outcome of decoding one inbound frame.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed sync message.
    Message(SyncMessage),
    /// A frame for some other consumer of the transport.
    Foreign(String),
    /// A frame that claims to be a sync message (or isn't JSON at all) but
    /// can't be interpreted.
    Malformed(String),
}

/// Decode a raw frame without side effects.
pub fn decode_frame(frame: &str) -> Decoded {
    let value: serde_json::Value = match serde_json::from_str(frame) {
        Ok(value) => value,
        Err(e) => return Decoded::Malformed(e.to_string()),
    };

    let kind = value.get("type").and_then(|t| t.as_str()).map(str::to_string);
    match kind {
        Some(kind) if SyncMessage::KNOWN_TYPES.contains(&kind.as_str()) => {
            match serde_json::from_value::<SyncMessage>(value) {
                Ok(message) => Decoded::Message(message),
                Err(e) => Decoded::Malformed(e.to_string()),
            }
        }
        Some(kind) => Decoded::Foreign(kind),
        None => Decoded::Malformed("envelope has no string 'type'".to_string()),
    }
}

#[derive(Debug, Default)]
struct ChannelCounters {
    published: AtomicU64,
    publish_failures: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Counters for one channel adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Messages handed to the transport successfully.
    pub published: u64,
    /// Publishes the transport rejected.
    pub publish_failures: u64,
    /// Well-formed sync messages received.
    pub received: u64,
    /// Inbound frames dropped as malformed.
    pub dropped: u64,
}

/// Sync-message adapter over a [`Transport`].
///
/// Publishing never fails from the caller's point of view: transport errors
/// are logged and counted, and the message is lost.
pub struct CrossContextChannel {
    transport: Arc<dyn Transport>,
    listeners: Arc<CallbackRegistry<SyncMessage>>,
    counters: Arc<ChannelCounters>,
}

impl CrossContextChannel {
    /// Wrap `transport` and start decoding inbound frames.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let listeners: Arc<CallbackRegistry<SyncMessage>> = Arc::new(CallbackRegistry::new());
        let counters = Arc::new(ChannelCounters::default());

        let inbound_listeners = Arc::clone(&listeners);
        let inbound_counters = Arc::clone(&counters);
        let name = transport.name().to_string();
        transport.set_listener(Some(Arc::new(move |frame: &str| match decode_frame(frame) {
            Decoded::Message(message) => {
                inbound_counters.received.fetch_add(1, Ordering::SeqCst);
                inbound_listeners.emit(&message);
            }
            Decoded::Foreign(kind) => {
                log::debug!("ignoring '{kind}' message on channel '{name}'");
            }
            Decoded::Malformed(reason) => {
                inbound_counters.dropped.fetch_add(1, Ordering::SeqCst);
                log::warn!("dropping malformed message on channel '{name}': {reason}");
            }
        })));

        Self {
            transport,
            listeners,
            counters,
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// Broadcast `message` to the other contexts.
    ///
    /// Returns whether the transport accepted it. Failures are logged here.
    pub fn publish(&self, message: &SyncMessage) -> bool {
        let sent = serde_json::to_string(message)
            .map_err(SoccorsoError::from)
            .and_then(|frame| self.transport.post(&frame));

        match sent {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(e) => {
                self.counters.publish_failures.fetch_add(1, Ordering::SeqCst);
                log::warn!("broadcast on channel '{}' skipped: {}", self.name(), e);
                false
            }
        }
    }

    /// Register a listener for decoded inbound messages.
    pub fn subscribe(&self, listener: MessageListener) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    /// Remove a listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            published: self.counters.published.load(Ordering::SeqCst),
            publish_failures: self.counters.publish_failures.load(Ordering::SeqCst),
            received: self.counters.received.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
        }
    }

    /// Stop listening and detach from the transport.
    pub fn close(&self) {
        self.listeners.clear();
        self.transport.close();
    }
}

impl std::fmt::Debug for CrossContextChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossContextChannel")
            .field("name", &self.name())
            .field("listeners", &self.listeners.subscriber_count())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collect(channel: &CrossContextChannel) -> Arc<Mutex<Vec<SyncMessage>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        channel.subscribe(Arc::new(move |message: &SyncMessage| {
            seen_clone.lock().unwrap().push(message.clone());
        }));
        seen
    }

    #[test]
    fn test_wire_envelope() {
        let message =
            SyncMessage::SyncStateFromOtherContext(SharedState::new(Some("veneto"), None));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "SyncStateFromOtherContext",
                "payload": {"selectedRegion": "veneto", "selectedDispatchCenter": null}
            })
        );
    }

    #[test]
    fn test_decode_frame_variants() {
        assert!(matches!(
            decode_frame(r#"{"type":"SyncStateFromOtherContext","payload":{"selectedRegion":"lazio","selectedDispatchCenter":"NORD"}}"#),
            Decoded::Message(_)
        ));
        assert!(matches!(
            decode_frame(r#"{"type":"SpeechQueued","payload":{}}"#),
            Decoded::Foreign(kind) if kind == "SpeechQueued"
        ));
        assert!(matches!(
            decode_frame(r#"{"type":"SyncStateFromOtherContext","payload":{"selectedRegion":42}}"#),
            Decoded::Malformed(_)
        ));
        assert!(matches!(
            decode_frame(r#"{"type":"SyncStateFromOtherContext","payload":null}"#),
            Decoded::Malformed(_)
        ));
        assert!(matches!(decode_frame("not json"), Decoded::Malformed(_)));
        assert!(matches!(decode_frame(r#"{"payload":{}}"#), Decoded::Malformed(_)));
    }

    #[test]
    fn test_publish_reaches_other_channel() {
        let hub = ChannelHub::new();
        let a = CrossContextChannel::new(Arc::new(hub.open("soccorso-sync")));
        let b = CrossContextChannel::new(Arc::new(hub.open("soccorso-sync")));
        let seen_a = collect(&a);
        let seen_b = collect(&b);

        let message = SyncMessage::SyncStateFromOtherContext(SharedState::new(Some("lazio"), None));
        assert!(a.publish(&message));

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(*seen_b.lock().unwrap(), vec![message]);
        assert_eq!(a.stats().published, 1);
        assert_eq!(b.stats().received, 1);
    }

    #[test]
    fn test_malformed_frames_are_dropped_and_counted() {
        let hub = ChannelHub::new();
        let raw = hub.open("soccorso-sync");
        let channel = CrossContextChannel::new(Arc::new(hub.open("soccorso-sync")));
        let seen = collect(&channel);

        raw.post("garbage").unwrap();
        raw.post(r#"{"type":"SyncStateFromOtherContext","payload":"lazio"}"#)
            .unwrap();
        raw.post(r#"{"type":"Heartbeat","payload":{}}"#).unwrap();

        assert!(seen.lock().unwrap().is_empty());
        let stats = channel.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.received, 0);
    }

    #[test]
    fn test_publish_on_closed_transport_is_swallowed() {
        let hub = ChannelHub::new();
        let channel = CrossContextChannel::new(Arc::new(hub.open("soccorso-sync")));
        channel.close();

        let message = SyncMessage::SyncStateFromOtherContext(SharedState::default());
        assert!(!channel.publish(&message));
        assert_eq!(channel.stats().publish_failures, 1);
    }
}
