//! Tile provider client

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use polaris_common::config::TilesConfig;
use polaris_common::geo::TileCoord;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Tile image fetched from the provider
#[derive(Debug, Clone)]
pub struct FetchedTile {
    pub data: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, layer: &str, coord: TileCoord) -> Result<FetchedTile>;
}

/// Fill the `{layer}`, `{z}`, `{x}`, `{y}` and `{key}` placeholders
pub fn expand_url(template: &str, layer: &str, coord: TileCoord, key: &str) -> String {
    template
        .replace("{layer}", layer)
        .replace("{z}", &coord.z.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string())
        .replace("{key}", key)
}

/// HTTP client for a slippy-map tile provider
pub struct HttpTileFetcher {
    client: Client,
    url_template: String,
    api_key: String,
}

impl HttpTileFetcher {
    pub fn new(config: &TilesConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("polaris-tiles/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url_template: config.upstream_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, layer: &str, coord: TileCoord) -> Result<FetchedTile> {
        let url = expand_url(&self.url_template, layer, coord, &self.api_key);
        debug!(tile = %coord, layer, "Fetching tile from provider");

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let data = response.bytes().await?;

        Ok(FetchedTile { data, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_url() {
        let coord = TileCoord::new(16, 19821, 24236).unwrap();
        let url = expand_url(
            "https://api.maptiler.com/maps/{layer}/{z}/{x}/{y}.png?key={key}",
            "aquarelle",
            coord,
            "abc",
        );
        assert_eq!(
            url,
            "https://api.maptiler.com/maps/aquarelle/16/19821/24236.png?key=abc"
        );
    }
}
