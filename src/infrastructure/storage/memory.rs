use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use super::{ObjectStore, StorageError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// In-process object store for tests and local runs.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    writes: Mutex<Vec<String>>,
    fail_puts: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: &str, body: impl Into<Bytes>, content_type: &str) {
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every key passed to `put`, in call order.
    pub async fn writes(&self) -> Vec<String> {
        self.writes.lock().await.clone()
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("put {} rejected", key)));
        }
        self.writes.lock().await.push(key.to_string());
        self.insert(key, body, content_type).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_and_records_each_write() {
        let store = MemoryStorage::new();
        store.put("k", Bytes::from_static(b"one"), "text/plain").await.unwrap();
        store.put("k", Bytes::from_static(b"two"), "text/plain").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(store.keys().await, vec!["k".to_string()]);
        assert_eq!(store.writes().await.len(), 2);
    }

    #[tokio::test]
    async fn failing_puts_leave_the_store_untouched() {
        let store = MemoryStorage::new();
        store.set_fail_puts(true);
        let err = store.put("k", Bytes::from_static(b"one"), "text/plain").await;
        assert!(matches!(err, Err(StorageError::Backend(_))));
        assert!(store.writes().await.is_empty());

        store.set_fail_puts(false);
        store.put("k", Bytes::from_static(b"one"), "text/plain").await.unwrap();
        assert_eq!(store.keys().await, vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryStorage::new();
        assert!(matches!(store.get("nope").await, Err(StorageError::NotFound(_))));
    }
}
