//! # Polaris Tile Cache
//!
//! Map tiles for the tour area, served cache-first:
//! - SQLite tile store
//! - Provider fallback with a placeholder on failure
//! - Rate-limited pre-population of a bounding box

pub mod api;
pub mod cache;
pub mod error;
pub mod prefetch;
pub mod store;
pub mod upstream;

pub use cache::{Tile, TileCache, TileSource};
pub use error::{Error, Result};
pub use prefetch::{prefetch, PrefetchOptions, PrefetchSummary};
pub use store::TileStore;
pub use upstream::{HttpTileFetcher, TileFetcher};
