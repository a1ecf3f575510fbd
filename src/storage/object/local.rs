use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Url;
use tokio::fs;
use tracing::info;

use super::{public_url, validate_key, ObjectStorage};
use crate::storage::{StorageError, StorageResult};

/// Writes objects below a root directory. When a public base URL is set
/// (a static file server or bucket in front of the directory) returned URLs
/// point there, otherwise they are `file://` URLs of the written files.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        let path = self.root.join(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&path, &data).await?;
        info!("Stored object {} ({} bytes, {})", key, data.len(), content_type);

        match &self.public_base_url {
            Some(base) => Ok(public_url(Some(base), key)),
            None => {
                let absolute = fs::canonicalize(&path).await?;
                Url::from_file_path(&absolute)
                    .map(|url| url.to_string())
                    .map_err(|_| StorageError::InvalidKey(key.to_string()))
            }
        }
    }
}
