//! Cache-first tile lookup
//!
//! Store hit → cached bytes. Miss → provider; a successful response is stored
//! before it is returned. Any failure → the placeholder image, so a tile
//! request never fails outright.

use crate::store::TileStore;
use crate::upstream::TileFetcher;
use bytes::Bytes;
use polaris_common::geo::TileCoord;
use std::sync::Arc;
use tracing::{debug, warn};

/// Neutral tile shown when neither cache nor provider can serve one
pub const PLACEHOLDER_PNG: &[u8] = include_bytes!("placeholder.png");

/// Where a served tile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileSource {
    Cache,
    Network,
    Placeholder,
}

impl TileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileSource::Cache => "cache",
            TileSource::Network => "network",
            TileSource::Placeholder => "placeholder",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub data: Bytes,
    pub content_type: String,
    pub source: TileSource,
}

impl Tile {
    pub fn placeholder() -> Self {
        Self {
            data: Bytes::from_static(PLACEHOLDER_PNG),
            content_type: "image/png".to_string(),
            source: TileSource::Placeholder,
        }
    }
}

#[derive(Clone)]
pub struct TileCache {
    store: TileStore,
    fetcher: Arc<dyn TileFetcher>,
}

impl TileCache {
    pub fn new(store: TileStore, fetcher: Arc<dyn TileFetcher>) -> Self {
        Self { store, fetcher }
    }

    pub fn store(&self) -> &TileStore {
        &self.store
    }

    pub fn fetcher(&self) -> &Arc<dyn TileFetcher> {
        &self.fetcher
    }

    pub async fn get(&self, layer: &str, coord: TileCoord) -> Tile {
        match self.store.get(layer, coord).await {
            Ok(Some(stored)) => {
                debug!(tile = %coord, layer, "Tile served from cache");
                return Tile {
                    data: Bytes::from(stored.data),
                    content_type: stored.content_type,
                    source: TileSource::Cache,
                };
            }
            Ok(None) => {}
            // A broken store must not stop the map from loading
            Err(e) => warn!(tile = %coord, "Tile store lookup failed: {}", e),
        }

        let fetched = match self.fetcher.fetch(layer, coord).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(tile = %coord, layer, "Tile fetch failed, serving placeholder: {}", e);
                return Tile::placeholder();
            }
        };

        if let Err(e) = self
            .store
            .put(layer, coord, &fetched.data, &fetched.content_type)
            .await
        {
            warn!(tile = %coord, "Failed to store tile: {}", e);
        }

        Tile {
            data: fetched.data,
            content_type: fetched.content_type,
            source: TileSource::Network,
        }
    }
}
