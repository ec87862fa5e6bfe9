//! Polaris Tile Cache (polaris-tiles) - Main entry point
//!
//! `serve` runs the cache-first tile endpoint; `prefetch` fills the store
//! for the configured tour area ahead of time.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polaris_common::config::{self, ROOT_FOLDER_ENV};
use polaris_common::db::{init_database, DATABASE_FILE};
use polaris_tiles::api::{create_router, AppState};
use polaris_tiles::{prefetch, HttpTileFetcher, PrefetchOptions, TileCache, TileStore};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for polaris-tiles
#[derive(Parser, Debug)]
#[command(name = "polaris-tiles")]
#[command(about = "Map tile cache for Polaris tours")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, global = true, env = "POLARIS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, global = true, env = "POLARIS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve tiles over HTTP
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "POLARIS_TILES_PORT")]
        port: Option<u16>,
    },
    /// Download every tile of the configured area into the store
    Prefetch {
        /// Zoom level to fetch; repeatable, defaults to the configured list
        #[arg(short, long = "zoom")]
        zooms: Vec<u8>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        config::load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root_folder =
        config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &config);
    info!("Root folder: {}", root_folder.display());

    let db = init_database(&root_folder.join(DATABASE_FILE))
        .await
        .context("Failed to initialize database")?;

    let tiles = &config.tiles;
    let fetcher = HttpTileFetcher::new(tiles).context("Failed to create tile client")?;
    if !fetcher.has_api_key() {
        warn!("No tile provider API key configured; uncached tiles will be placeholders");
    }
    let cache = TileCache::new(TileStore::new(db), Arc::new(fetcher));

    match args.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(tiles.port);
            let app = create_router(AppState {
                cache,
                layer: tiles.layer.clone(),
                bounds: tiles.bounds,
                min_zoom: tiles.min_zoom,
                max_zoom: tiles.max_zoom,
                port,
            });

            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            info!("Starting Polaris Tile Cache on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .context("Failed to bind to address")?;

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;

            info!("Server shutdown complete");
        }
        Command::Prefetch { zooms } => {
            let zooms = if zooms.is_empty() {
                tiles.prefetch_zooms.clone()
            } else {
                zooms
            };
            if let Some(z) = zooms
                .iter()
                .find(|z| **z < tiles.min_zoom || **z > tiles.max_zoom)
            {
                anyhow::bail!(
                    "zoom {} outside the configured range [{}, {}]",
                    z,
                    tiles.min_zoom,
                    tiles.max_zoom
                );
            }

            let options = PrefetchOptions {
                layer: tiles.layer.clone(),
                bounds: tiles.bounds,
                zooms,
                requests_per_second: tiles.requests_per_second,
                batch_size: tiles.batch_size,
            };
            let summary = prefetch(&cache, &options)
                .await
                .context("Prefetch aborted")?;

            info!(
                "Prefetch finished: {} tiles, {} already cached, {} fetched, {} failed",
                summary.total, summary.cached, summary.fetched, summary.failed
            );
        }
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
