use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An archived object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub body: String,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

/// Object store seam for poison-pill archives. Writes are keyed and
/// overwrite idempotently.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object; returns its location
    async fn put(
        &self,
        key: &str,
        body: &str,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String>;
}

/// In-memory object store (standalone deployment and testing)
pub struct InMemoryObjectStore {
    objects: Arc<DashMap<String, StoredObject>>,
    fail_puts: Arc<AtomicBool>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(DashMap::new()),
            fail_puts: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        body: &str,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::ObjectStore("put rejected".to_string()));
        }

        self.objects.insert(
            key.to_string(),
            StoredObject {
                key: key.to_string(),
                body: body.to_string(),
                content_type: content_type.to_string(),
                metadata,
            },
        );
        Ok(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_overwrites_idempotently() {
        let store = InMemoryObjectStore::new();

        let location = store
            .put("poison-pills/2024-03-01/orders-dlq/m-1.json", "{\"a\":1}", "application/json", HashMap::new())
            .await
            .unwrap();
        store
            .put("poison-pills/2024-03-01/orders-dlq/m-1.json", "{\"a\":2}", "application/json", HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(location, "poison-pills/2024-03-01/orders-dlq/m-1.json");
        assert_eq!(store.get(&location).unwrap().body, "{\"a\":2}");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryObjectStore::new();
        store.set_fail_puts(true);
        assert!(store
            .put("k", "{}", "application/json", HashMap::new())
            .await
            .is_err());
        assert!(store.is_empty());
    }
}
