//! Durable storage for the usage log.
//!
//! The usage store keeps the whole log in memory and hands a serialized
//! snapshot to a [`BlobStore`] after every append. Backends only need to
//! read and replace one opaque blob.

mod file;
mod sqlite;
mod usage_store;

pub use file::{FileBlobStore, MemoryBlobStore};
pub use sqlite::SqliteBlobStore;
pub use usage_store::UsageStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("usage data is unreadable: {0:#}")]
    ReadCorrupt(anyhow::Error),

    #[error("failed to persist usage data: {0:#}")]
    WriteFailed(anyhow::Error),

    #[error("failed to serialize usage data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("rejected session: {0}")]
    InvalidSession(String),
}

/// Replace-whole-blob persistence used by [`UsageStore`].
///
/// `write_all` must be atomic from a reader's point of view: a concurrent or
/// later `read_all` sees either the previous blob or the new one.
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` when nothing has ever been written.
    fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError>;

    fn write_all(&self, bytes: &[u8]) -> Result<(), StoreError>;

    /// Copies unreadable data somewhere the next `write_all` will not touch.
    /// Returns where it went, or `None` if the backend keeps no copies.
    fn preserve(&self, _bytes: &[u8]) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    /// Where the data lives, for log messages.
    fn describe(&self) -> String;
}

/// Which backend the host should open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Json => "json",
            StorageBackend::Sqlite => "sqlite",
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "json" => Ok(StorageBackend::Json),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(format!("unknown storage backend '{other}' (expected json or sqlite)")),
        }
    }
}
