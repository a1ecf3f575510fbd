use std::sync::RwLock;

use async_trait::async_trait;

use super::{Asset, AssetStorage, NewAsset};
use crate::storage::{StorageError, StorageResult};

#[derive(Default)]
pub struct InMemoryAssetStorage {
    assets: RwLock<Vec<Asset>>,
}

impl InMemoryAssetStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> StorageResult<Vec<Asset>> {
        let assets = self
            .assets
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(assets.clone())
    }
}

#[async_trait]
impl AssetStorage for InMemoryAssetStorage {
    async fn create_asset(&self, asset: NewAsset) -> StorageResult<Asset> {
        let asset = asset.into_asset();
        let mut assets = self
            .assets
            .write()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        assets.push(asset.clone());
        Ok(asset)
    }

    async fn find_by_owner_and_location(
        &self,
        owner_id: Option<&str>,
        location: &str,
    ) -> StorageResult<Vec<Asset>> {
        let assets = self
            .assets
            .read()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(assets
            .iter()
            .filter(|a| a.owner_id.as_deref() == owner_id && a.location == location)
            .cloned()
            .collect())
    }
}
