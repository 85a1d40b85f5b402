use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the storage backends.
///
/// Reads never produce these for missing or corrupt records; those come back as `None`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create storage directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list storage directory {}: {source}", .path.display())]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write workflow file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode workflow record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid workflow key component: {0:?}")]
    InvalidKey(String),

    #[error("stored value does not match the requested type: {0}")]
    Payload(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
