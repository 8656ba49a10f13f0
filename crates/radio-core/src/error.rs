//! Error types for the catalog, storage, and playback layers.
//!
//! Every failure here is recovered at the component boundary: the catalog
//! returns these from its operations, `PlayerCore` turns them into a reply
//! error plus a transient notice.  Nothing in the core escalates to a panic.

use thiserror::Error;

/// Failures of the injected key-value store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures fetching the bundled default station list.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("default station list not readable: {0}")]
    Io(#[from] std::io::Error),

    #[error("default station list request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("default station list returned HTTP {0}")]
    Status(u16),
}

/// Failures writing an exported station list.
#[derive(Error, Debug)]
#[error("export to '{filename}' failed: {source}")]
pub struct ExportError {
    pub filename: String,
    #[source]
    pub source: std::io::Error,
}

/// Catalog operation errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("a station with stream URL '{0}' already exists")]
    Duplicate(String),

    #[error("invalid station: {0}")]
    Invalid(&'static str),

    #[error("no station with id '{0}'")]
    NotFound(String),

    #[error("No valid stations found in file")]
    NoValidStations,

    #[error("Failed to read file: {0}")]
    Read(#[source] std::io::Error),

    #[error("default stations unavailable: {0}")]
    DefaultsUnavailable(#[source] SourceError),

    #[error("default station list contains no stations")]
    DefaultsEmpty,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Synchronous failures reported by the streaming handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("stream handle could not be created: {0}")]
    Open(String),

    #[error("playback request rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimerError {
    #[error("sleep timer must be between 1 and {max} minutes, got {got}")]
    OutOfRange { got: u32, max: u32 },
}

/// Errors returned to collaborators through a command reply.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error("no station with id '{0}'")]
    UnknownStation(String),

    #[error("player core is not running")]
    Closed,
}
