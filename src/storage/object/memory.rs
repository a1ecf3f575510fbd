use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{public_url, validate_key, ObjectStorage};
use crate::storage::{StorageError, StorageResult};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Keeps objects in a map; URLs are `{base_url}/{key}`.
pub struct InMemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let objects = self
            .objects
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(objects.get(key).cloned())
    }

    pub fn keys(&self) -> StorageResult<Vec<String>> {
        let objects = self
            .objects
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(objects.keys().cloned().collect())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        let mut objects = self
            .objects
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(public_url(Some(&self.base_url), key))
    }
}
