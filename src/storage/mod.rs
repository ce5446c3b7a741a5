//! Blob storage port for event images.

use async_trait::async_trait;
use thiserror::Error;

pub mod local;

pub use local::LocalObjectStore;

/// Bucket holding uploaded event images.
pub const EVENT_IMAGES_BUCKET: &str = "event-images";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `bucket/path` and return its public URL.
    /// Never overwrites an existing object.
    async fn put(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Remove `bucket/path`. Removing a missing object is not an error.
    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError>;
}
