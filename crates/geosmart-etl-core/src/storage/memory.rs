use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    ObjectStore, validate_key,
    error::{NotFoundSnafu, StorageResult},
};

/// In-process object store.
///
/// The lock is held for a single map operation and never across an await.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Bytes>> {
        // Map operations never panic midway, so a poisoned map is still consistent.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        validate_key(key)?;
        self.lock().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        let found = self.lock().get(key).cloned();
        match found {
            Some(bytes) => Ok(bytes),
            None => NotFoundSnafu { key }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[tokio::test]
    async fn put_then_get_roundtrip() -> Result<(), StorageError> {
        let store = MemoryStore::new();
        store.put("k/v1", Bytes::from_static(b"one")).await?;
        store.put("k/v1", Bytes::from_static(b"two")).await?;
        assert_eq!(store.get("k/v1").await?, Bytes::from_static(b"two"));
        assert_eq!(store.keys(), vec!["k/v1".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("absent").await,
            Err(StorageError::NotFound { .. })
        ));
    }
}
