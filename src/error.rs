//! Error types shared by the catalog, queue, device, and config layers.

use thiserror::Error;

/// Failures while loading or querying the track catalog.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    /// The upstream source could not produce records.
    #[error("catalog source failed: {0}")]
    Source(String),
    /// A record was present but unusable.
    #[error("malformed catalog record: {0}")]
    MalformedRecord(String),
    #[error("catalog io error: {0}")]
    Io(String),
    #[error("catalog json error: {0}")]
    Json(String),
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Failures raised by a playback device (local renderer or remote receiver).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeviceError {
    /// The renderer could not load or prepare the requested source.
    #[error("render error: {0}")]
    Render(String),
    /// The queue item references a track the catalog does not know.
    #[error("unknown track {0}")]
    UnknownTrack(String),
    #[error("device not connected")]
    NotConnected,
}

/// Failures while building or navigating the play queue.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    /// A media id or search matched nothing playable.
    #[error("no playable music for {0}")]
    InvalidTarget(String),
    #[error("queue is empty")]
    EmptyQueue,
    /// A browse category contained a reserved separator.
    #[error("invalid browse category {0:?}")]
    InvalidCategory(String),
    /// The current queue item has no catalog entry.
    #[error("no metadata for track {0}")]
    MissingMetadata(String),
}

/// Failures while loading or persisting `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// The existing file could not be edited in place.
    #[error("config document error: {0}")]
    Document(String),
    #[error("no config directory available")]
    NoConfigDir,
}
