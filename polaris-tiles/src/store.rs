//! Durable tile storage in the `tiles` table

use crate::error::Result;
use chrono::Utc;
use polaris_common::geo::TileCoord;
use sqlx::SqlitePool;

/// Tile image as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTile {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Clone)]
pub struct TileStore {
    db: SqlitePool,
}

impl TileStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get(&self, layer: &str, coord: TileCoord) -> Result<Option<StoredTile>> {
        let row: Option<(Vec<u8>, String)> = sqlx::query_as(
            "SELECT data, content_type FROM tiles WHERE layer = ? AND z = ? AND x = ? AND y = ?",
        )
        .bind(layer)
        .bind(i64::from(coord.z))
        .bind(i64::from(coord.x))
        .bind(i64::from(coord.y))
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(data, content_type)| StoredTile { data, content_type }))
    }

    pub async fn contains(&self, layer: &str, coord: TileCoord) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM tiles WHERE layer = ? AND z = ? AND x = ? AND y = ?",
        )
        .bind(layer)
        .bind(i64::from(coord.z))
        .bind(i64::from(coord.x))
        .bind(i64::from(coord.y))
        .fetch_optional(&self.db)
        .await?;

        Ok(found.is_some())
    }

    /// Insert or refresh a tile
    pub async fn put(
        &self,
        layer: &str,
        coord: TileCoord,
        data: &[u8],
        content_type: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO tiles (layer, z, x, y, data, content_type, fetched_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(layer, z, x, y) DO UPDATE SET
                data = excluded.data,
                content_type = excluded.content_type,
                fetched_at = excluded.fetched_at",
        )
        .bind(layer)
        .bind(i64::from(coord.z))
        .bind(i64::from(coord.x))
        .bind(i64::from(coord.y))
        .bind(data)
        .bind(content_type)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Number of tiles stored for `layer`
    pub async fn count(&self, layer: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tiles WHERE layer = ?")
            .bind(layer)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_common::db::init_memory_database;

    #[tokio::test]
    async fn test_put_get_and_overwrite() {
        let store = TileStore::new(init_memory_database().await.unwrap());
        let coord = TileCoord::new(16, 19821, 24236).unwrap();

        assert!(store.get("aquarelle", coord).await.unwrap().is_none());
        assert!(!store.contains("aquarelle", coord).await.unwrap());

        store.put("aquarelle", coord, b"v1", "image/png").await.unwrap();
        store.put("aquarelle", coord, b"v2", "image/png").await.unwrap();

        let tile = store.get("aquarelle", coord).await.unwrap().unwrap();
        assert_eq!(tile.data, b"v2");
        assert_eq!(tile.content_type, "image/png");
        assert_eq!(store.count("aquarelle").await.unwrap(), 1);

        // Layers are separate namespaces
        assert!(!store.contains("streets", coord).await.unwrap());
    }
}
