use serde::Serialize;
use thiserror::Error;

/// Unified error type for soccorso operations
#[derive(Debug, Error)]
pub enum SoccorsoError {
    // IO errors
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    /// Writing a key to the file-backed store failed.
    #[error("Failed to write storage key '{key}': {source}")]
    StorageWrite {
        /// The key being written
        key: String,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// The store cannot be reached at all.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A write would take the store past its quota.
    #[error("Storage quota exceeded writing '{key}': {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        /// The key being written
        key: String,
        /// Bytes the store would hold after the write
        needed: usize,
        /// Bytes the store may hold
        quota: usize,
    },

    /// A persisted snapshot carries a format version this build can't read.
    #[error("Unsupported snapshot version {0}")]
    UnsupportedSnapshotVersion(u32),

    // Serialization errors
    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Config errors
    /// The config file is not valid TOML for [`SyncConfig`](crate::config::SyncConfig).
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The config could not be written as TOML.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// The platform has no config or data directory.
    #[error("Could not determine config directory")]
    NoConfigDir,

    // Channel errors
    /// A post was attempted on a closed channel endpoint.
    #[error("Channel '{0}' is closed")]
    ChannelClosed(String),
}

/// Result type alias for soccorso operations
pub type Result<T> = std::result::Result<T, SoccorsoError>;

/// A serializable representation of SoccorsoError for the UI boundary
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&SoccorsoError> for SerializableError {
    fn from(err: &SoccorsoError) -> Self {
        let kind = match err {
            SoccorsoError::Io(_) => "Io",
            SoccorsoError::StorageWrite { .. } => "StorageWrite",
            SoccorsoError::StorageUnavailable(_) => "StorageUnavailable",
            SoccorsoError::QuotaExceeded { .. } => "QuotaExceeded",
            SoccorsoError::UnsupportedSnapshotVersion(_) => "UnsupportedSnapshotVersion",
            SoccorsoError::Json(_) => "Json",
            SoccorsoError::ConfigParse(_) => "ConfigParse",
            SoccorsoError::ConfigSerialize(_) => "ConfigSerialize",
            SoccorsoError::NoConfigDir => "NoConfigDir",
            SoccorsoError::ChannelClosed(_) => "ChannelClosed",
        }
        .to_string();

        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<SoccorsoError> for SerializableError {
    fn from(err: SoccorsoError) -> Self {
        SerializableError::from(&err)
    }
}

impl SoccorsoError {
    /// Convert to a serializable representation for the UI boundary
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}
