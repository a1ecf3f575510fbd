use async_trait::async_trait;

use crate::storage::{StorageError, StorageResult};

pub mod local;
pub mod memory;

pub use local::LocalObjectStorage;
pub use memory::InMemoryObjectStorage;

/// Blob store for generated audio.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    /// Store `data` under `key` and return the URL it can be fetched from.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;
}

/// Keys are relative, `/`-separated and may not climb out of the store.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// `{base_url}/{key}`, or the key itself without a base URL.
pub(crate) fn public_url(base_url: Option<&str>, key: &str) -> String {
    match base_url {
        Some(base) if !base.trim().is_empty() => {
            format!("{}/{}", base.trim_end_matches('/'), key)
        }
        _ => key.to_string(),
    }
}
