//! State store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the external key-value store backing snapshots.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State store is not connected")]
    NotConnected,

    #[error("State store unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to encode snapshot '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode snapshot '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("State store lock poisoned")]
    LockPoisoned,

    #[error("State store task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
