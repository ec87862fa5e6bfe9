//! Pre-population of the tile store for a bounding box
//!
//! Tiles already stored are skipped. The rest are fetched concurrently in
//! groups of `batch_size`, with every request passing a shared rate limiter.
//! Individual failures are logged and counted; only a credential rejection
//! aborts the run.

use crate::cache::TileCache;
use crate::error::{Error, Result};
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use polaris_common::geo::{BoundingBox, TileCoord};
use serde::Serialize;
use std::num::NonZeroU32;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PrefetchOptions {
    pub layer: String,
    pub bounds: BoundingBox,
    pub zooms: Vec<u8>,
    pub requests_per_second: u32,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchSummary {
    /// Tiles covering the box across all zoom levels
    pub total: usize,
    /// Already present, not requested
    pub cached: usize,
    pub fetched: usize,
    pub failed: usize,
}

/// Every tile covering `bounds` at each of `zooms`, without duplicates
pub fn plan(bounds: &BoundingBox, zooms: &[u8]) -> Vec<TileCoord> {
    let mut zooms = zooms.to_vec();
    zooms.sort_unstable();
    zooms.dedup();
    zooms.into_iter().flat_map(|z| bounds.tiles(z)).collect()
}

async fn fetch_and_store(cache: &TileCache, layer: &str, coord: TileCoord) -> Result<()> {
    let tile = cache.fetcher().fetch(layer, coord).await?;
    cache
        .store()
        .put(layer, coord, &tile.data, &tile.content_type)
        .await
}

pub async fn prefetch(cache: &TileCache, options: &PrefetchOptions) -> Result<PrefetchSummary> {
    let layer = options.layer.as_str();
    let tiles = plan(&options.bounds, &options.zooms);

    let mut summary = PrefetchSummary {
        total: tiles.len(),
        ..PrefetchSummary::default()
    };

    let mut missing = Vec::new();
    for coord in tiles {
        if cache.store().contains(layer, coord).await? {
            summary.cached += 1;
        } else {
            missing.push(coord);
        }
    }

    info!(
        layer,
        total = summary.total,
        cached = summary.cached,
        to_fetch = missing.len(),
        "Prefetching tiles"
    );

    let rate = NonZeroU32::new(options.requests_per_second).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(rate));
    let limiter = &limiter;

    let mut results = stream::iter(missing)
        .map(|coord| async move {
            limiter.until_ready().await;
            (coord, fetch_and_store(cache, layer, coord).await)
        })
        .buffer_unordered(options.batch_size.max(1));

    while let Some((coord, result)) = results.next().await {
        match result {
            Ok(()) => {
                summary.fetched += 1;
                debug!(tile = %coord, "Tile prefetched");
            }
            Err(Error::Unauthorized { status }) => {
                error!(
                    status,
                    fetched = summary.fetched,
                    "Tile provider rejected the API key, aborting prefetch"
                );
                return Err(Error::Unauthorized { status });
            }
            Err(e) => {
                summary.failed += 1;
                warn!(tile = %coord, "Tile prefetch failed: {}", e);
            }
        }
    }

    info!(
        layer,
        fetched = summary.fetched,
        failed = summary.failed,
        "Prefetch complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_dedups_zoom_levels() {
        let bounds = BoundingBox {
            north: 42.3760,
            south: 42.3730,
            east: -71.1140,
            west: -71.1170,
        };
        let once = plan(&bounds, &[16]);
        let twice = plan(&bounds, &[16, 16]);
        assert!(!once.is_empty());
        assert_eq!(once, twice);
        assert!(once.iter().all(|t| t.z == 16));
    }

    #[test]
    fn test_plan_grows_with_zoom() {
        let bounds = BoundingBox {
            north: 42.392885,
            south: 42.346177,
            east: -71.109761,
            west: -71.135884,
        };
        let z14 = plan(&bounds, &[14]).len();
        let z15 = plan(&bounds, &[15]).len();
        assert!(z15 >= z14 * 2, "z14={} z15={}", z14, z15);
    }
}
