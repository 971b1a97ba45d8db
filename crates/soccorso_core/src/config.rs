//! Configuration for the sync engine.
//!
//! [`SyncConfig`] names the store key and channel name every context of one
//! application instance must agree on, and picks the [`ReplayPolicy`].
//! Configuration is persisted as TOML (typically at
//! `~/.config/soccorso/config.toml` on Unix systems).
//!
//! # Example
//!
//! ```ignore
//! use soccorso_core::config::SyncConfig;
//!
//! let config = SyncConfig::load_or_default(&SyncConfig::default_path()?);
//! println!("syncing on channel {}", config.channel_name);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SoccorsoError};

/// Default key of the persisted snapshot.
pub const DEFAULT_STORE_KEY: &str = "soccorso-state";

/// Default name of the broadcast channel.
pub const DEFAULT_CHANNEL_NAME: &str = "soccorso-sync";

/// What happens to state changes caused by replayed data
/// (`ApplyExternalState`, `LoadFromStorage`).
///
/// Replays are never broadcast under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Replays only update the local container.
    #[default]
    Terminal,
    /// Replays that change state are also written to the durable store.
    Persist,
}

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Key under which the snapshot is stored
    #[serde(default = "default_store_key")]
    pub store_key: String,

    /// Name of the broadcast channel shared by all contexts
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Persistence of replayed state
    #[serde(default)]
    pub replay_policy: ReplayPolicy,

    /// Directory for the file-backed store (CLI and native shells)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_store_key() -> String {
    DEFAULT_STORE_KEY.to_string()
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_key: default_store_key(),
            channel_name: default_channel_name(),
            replay_policy: ReplayPolicy::default(),
            data_dir: None,
        }
    }
}

impl SyncConfig {
    /// Load config from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a TOML file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load config, falling back to defaults if the file is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(SoccorsoError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(e) => {
                log::warn!("using default config, {} is invalid: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Default config file location.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or(SoccorsoError::NoConfigDir)?;
        Ok(dir.join("soccorso").join("config.toml"))
    }

    /// Directory for the file-backed store: `data_dir` if set, else the
    /// platform data directory.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let dir = dirs::data_dir().ok_or(SoccorsoError::NoConfigDir)?;
                Ok(dir.join("soccorso"))
            }
        }
    }
}
