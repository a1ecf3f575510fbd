use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::StorageResult;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryAssetStorage;
pub use sqlite::SqliteAssetStorage;

/// A stored audio/video object: an ingested source or a synthesized output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub owner_id: Option<String>,
    pub location: String,
    pub display_name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub owner_id: Option<String>,
    pub location: String,
    pub display_name: String,
    pub description: Option<String>,
}

impl NewAsset {
    pub(crate) fn into_asset(self) -> Asset {
        let now = Utc::now();
        Asset {
            id: format!("asset-{}", uuid::Uuid::new_v4()),
            owner_id: self.owner_id,
            location: self.location,
            display_name: self.display_name,
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
pub trait AssetStorage: Send + Sync + 'static {
    async fn create_asset(&self, asset: NewAsset) -> StorageResult<Asset>;
    async fn find_by_owner_and_location(
        &self,
        owner_id: Option<&str>,
        location: &str,
    ) -> StorageResult<Vec<Asset>>;
}
