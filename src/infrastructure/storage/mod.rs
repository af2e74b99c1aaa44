pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Narrow object-store interface: whole-object reads and writes by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Overwrites any existing object under `key`.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;
}
