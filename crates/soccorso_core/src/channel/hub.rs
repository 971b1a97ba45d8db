//! In-process broadcast hub.
//!
//! [`ChannelHub`] models the host's named broadcast primitive for contexts
//! that live in one process (tests, the CLI simulator, a desktop shell with
//! several windows). Opening a name returns a [`ChannelEndpoint`]; a frame
//! posted on an endpoint is delivered synchronously to every *other* open
//! endpoint with the same name.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::{FrameListener, Transport};
use crate::error::{Result, SoccorsoError};

type ListenerSlot = Arc<RwLock<Option<FrameListener>>>;

#[derive(Default)]
struct HubInner {
    /// channel name -> endpoint id -> listener slot
    channels: RwLock<HashMap<String, BTreeMap<u64, ListenerSlot>>>,
    next_id: AtomicU64,
}

impl HubInner {
    fn detach(&self, name: &str, id: u64) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        if let Some(endpoints) = channels.get_mut(name) {
            endpoints.remove(&id);
            if endpoints.is_empty() {
                channels.remove(name);
            }
        }
    }
}

/// Shared broadcast medium. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct ChannelHub {
    inner: Arc<HubInner>,
}

impl ChannelHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new endpoint on the channel called `name`.
    pub fn open(&self, name: &str) -> ChannelEndpoint {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let slot: ListenerSlot = Arc::new(RwLock::new(None));
        {
            let mut channels = self.inner.channels.write().unwrap_or_else(|e| e.into_inner());
            channels
                .entry(name.to_string())
                .or_default()
                .insert(id, Arc::clone(&slot));
        }
        log::debug!("opened endpoint {id} on channel '{name}'");

        ChannelEndpoint {
            id,
            name: name.to_string(),
            hub: Arc::clone(&self.inner),
            slot,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of open endpoints on `name`.
    pub fn endpoint_count(&self, name: &str) -> usize {
        let channels = self.inner.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.get(name).map_or(0, BTreeMap::len)
    }
}

impl std::fmt::Debug for ChannelHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.inner.channels.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<_> = channels.keys().cloned().collect();
        names.sort();
        f.debug_struct("ChannelHub").field("channels", &names).finish()
    }
}

/// One context's handle on a named hub channel.
///
/// Dropping the endpoint closes it.
pub struct ChannelEndpoint {
    id: u64,
    name: String,
    hub: Arc<HubInner>,
    slot: ListenerSlot,
    closed: AtomicBool,
}

impl ChannelEndpoint {
    /// Unique id of this endpoint within its hub.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether [`close`](Transport::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for ChannelEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, frame: &str) -> Result<()> {
        if self.is_closed() {
            return Err(SoccorsoError::ChannelClosed(self.name.clone()));
        }

        let peers: Vec<FrameListener> = {
            let channels = self.hub.channels.read().unwrap_or_else(|e| e.into_inner());
            channels
                .get(&self.name)
                .into_iter()
                .flat_map(|endpoints| endpoints.iter())
                .filter(|(id, _)| **id != self.id)
                .filter_map(|(_, slot)| {
                    slot.read()
                        .unwrap_or_else(|e| e.into_inner())
                        .as_ref()
                        .map(Arc::clone)
                })
                .collect()
        };

        for listener in peers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(frame);
            }));
            if result.is_err() {
                log::warn!("listener on channel '{}' panicked", self.name);
            }
        }
        Ok(())
    }

    fn set_listener(&self, listener: Option<FrameListener>) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = listener;
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.set_listener(None);
            self.hub.detach(&self.name, self.id);
            log::debug!("closed endpoint {} on channel '{}'", self.id, self.name);
        }
    }
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
