use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{Asset, AssetStorage, NewAsset};
use crate::storage::{format_timestamp, parse_timestamp, StorageResult};

pub struct SqliteAssetStorage {
    pool: SqlitePool,
}

impl SqliteAssetStorage {
    /// Shares the pool with the task storage.
    pub async fn with_pool(pool: SqlitePool) -> StorageResult<Self> {
        info!("Initializing SQLite asset storage");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assets (
                id TEXT PRIMARY KEY,
                owner_id TEXT,
                location TEXT NOT NULL,
                display_name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_assets_owner_location ON assets (owner_id, location)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    fn row_to_asset(row: &SqliteRow) -> StorageResult<Asset> {
        let id: String = row.try_get("id")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(Asset {
            created_at: parse_timestamp(&id, &created_at)?,
            updated_at: parse_timestamp(&id, &updated_at)?,
            id,
            owner_id: row.try_get("owner_id")?,
            location: row.try_get("location")?,
            display_name: row.try_get("display_name")?,
            description: row.try_get("description")?,
        })
    }
}

#[async_trait]
impl AssetStorage for SqliteAssetStorage {
    async fn create_asset(&self, asset: NewAsset) -> StorageResult<Asset> {
        let asset = asset.into_asset();
        sqlx::query(
            r#"
            INSERT INTO assets (id, owner_id, location, display_name, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&asset.id)
        .bind(&asset.owner_id)
        .bind(&asset.location)
        .bind(&asset.display_name)
        .bind(&asset.description)
        .bind(format_timestamp(&asset.created_at))
        .bind(format_timestamp(&asset.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(asset)
    }

    async fn find_by_owner_and_location(
        &self,
        owner_id: Option<&str>,
        location: &str,
    ) -> StorageResult<Vec<Asset>> {
        let rows = sqlx::query(
            "SELECT * FROM assets WHERE owner_id IS ? AND location = ? ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .bind(location)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_asset).collect()
    }
}
