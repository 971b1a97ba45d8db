#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Shared state, actions and transitions
pub mod state;

/// Callback registry for subscriptions
pub mod registry;

/// Per-context state container
pub mod container;

/// Durable key-value storage and the snapshot adapter
pub mod storage;

/// Cross-context broadcast channel
pub mod channel;

/// Synchronization middleware (persist and broadcast policy)
pub mod middleware;

/// Hosting shell for one context
pub mod context;

pub use channel::{ChannelHub, CrossContextChannel, SyncMessage, Transport};
pub use config::{ReplayPolicy, SyncConfig};
pub use container::StateContainer;
pub use context::SyncContext;
pub use error::{Result, SoccorsoError};
pub use middleware::{ActionFate, DispatchOutcome, SyncMiddleware, SyncStats};
pub use state::{Action, ActionKind, SharedState};
pub use storage::{DurableStore, KeyValueStore, MemoryKeyValueStore};

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileKeyValueStore;
