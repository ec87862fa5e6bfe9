//! HTTP tile endpoint

use crate::cache::{Tile, TileCache};
use crate::error::ApiError;
use axum::{
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use polaris_common::geo::{BoundingBox, TileCoord};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

const TILE_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-tile-source");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: TileCache,
    /// The only layer served
    pub layer: String,
    /// Tour area; tiles outside it are never fetched or stored
    pub bounds: BoundingBox,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tiles/:layer/:z/:x/:file", get(get_tile))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "polaris-tiles",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}

/// Parse `{z}/{x}/{y}.png` path segments into a tile address within the zoom range
pub fn parse_tile_path(
    z: &str,
    x: &str,
    file: &str,
    min_zoom: u8,
    max_zoom: u8,
) -> Result<TileCoord, ApiError> {
    let bad = |what: &str| ApiError::BadRequest(format!("invalid tile {}: {}/{}/{}", what, z, x, file));

    let y = file.strip_suffix(".png").ok_or_else(|| bad("extension"))?;
    let z: u8 = z.parse().map_err(|_| bad("zoom"))?;
    let x: u32 = x.parse().map_err(|_| bad("column"))?;
    let y: u32 = y.parse().map_err(|_| bad("row"))?;

    if z < min_zoom || z > max_zoom {
        return Err(ApiError::BadRequest(format!(
            "zoom {} outside [{}, {}]",
            z, min_zoom, max_zoom
        )));
    }

    TileCoord::new(z, x, y).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// GET /tiles/:layer/:z/:x/:y.png
async fn get_tile(
    State(state): State<AppState>,
    Path((layer, z, x, file)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    if layer != state.layer {
        return Err(ApiError::NotFound(format!("unknown tile layer: {}", layer)));
    }
    let coord = parse_tile_path(&z, &x, &file, state.min_zoom, state.max_zoom)?;

    let tile = if state.bounds.covers_tile(&coord) {
        state.cache.get(&layer, coord).await
    } else {
        debug!(tile = %coord, "Tile outside the tour area, serving placeholder");
        Tile::placeholder()
    };

    let content_type = HeaderValue::from_str(&tile.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("image/png"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                TILE_SOURCE_HEADER,
                HeaderValue::from_static(tile.source.as_str()),
            ),
        ],
        tile.data,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tile_path() {
        let coord = parse_tile_path("16", "19821", "24236.png", 14, 19).unwrap();
        assert_eq!(coord, TileCoord { z: 16, x: 19821, y: 24236 });

        assert!(parse_tile_path("16", "19821", "24236.jpg", 14, 19).is_err());
        assert!(parse_tile_path("12", "1000", "1500.png", 14, 19).is_err());
        assert!(parse_tile_path("16", "-1", "0.png", 14, 19).is_err());
        // Row beyond the 2^16 grid
        assert!(parse_tile_path("16", "0", "70000.png", 14, 19).is_err());
    }
}
