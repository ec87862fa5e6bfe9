//! Polaris Tour Guide (polaris-guide) - Main entry point
//!
//! Location-aware narration service: loads the landmark catalog, restores
//! persisted tour state and serves the control API, SSE events and the
//! chat/speech relay endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use polaris_common::config::{self, ROOT_FOLDER_ENV};
use polaris_common::db::{init_database, DATABASE_FILE};
use polaris_common::{EventBus, LandmarkCatalog};
use polaris_guide::api::{server, AppContext};
use polaris_guide::audio::{AudioController, AudioOutput, ClockOutput, SpoolDir};
use polaris_guide::narration::{NarrationSession, NarrationSettings};
use polaris_guide::services::{
    CachedSpeech, ChatService, OpenAiChat, OpenAiSpeech, SpeechService,
};
use polaris_guide::TourGuide;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Events buffered per SSE subscriber before the oldest are dropped
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for polaris-guide
#[derive(Parser, Debug)]
#[command(name = "polaris-guide")]
#[command(about = "Location-aware narration service for Polaris tours")]
#[command(version)]
struct Args {
    /// Root folder holding content, database and audio spool
    #[arg(short, long, env = "POLARIS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "POLARIS_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "POLARIS_GUIDE_PORT")]
    port: Option<u16>,
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
    let port = args.port.unwrap_or(config.port);

    info!("Starting Polaris Tour Guide on port {}", port);
    info!("Root folder: {}", root_folder.display());

    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;

    let db = init_database(&root_folder.join(DATABASE_FILE))
        .await
        .context("Failed to initialize database")?;

    let catalog = Arc::new(LandmarkCatalog::load_or_empty(
        &config.content_path(&root_folder, &config.content.landmarks_csv),
        &config.content_path(&root_folder, &config.content.places),
    ));

    if config.openai.api_key.as_deref().map_or(true, str::is_empty) {
        warn!("No OpenAI API key configured; answers and speech will fail");
    }

    let chat: Arc<dyn ChatService> =
        Arc::new(OpenAiChat::new(&config.openai).context("Failed to create chat client")?);
    let speech: Arc<dyn SpeechService> = Arc::new(CachedSpeech::new(
        OpenAiSpeech::new(&config.openai).context("Failed to create speech client")?,
        &config.speech_cache,
    ));

    let spool = Arc::new(
        SpoolDir::open(root_folder.join("spool")).context("Failed to open audio spool")?,
    );
    let events = EventBus::new(EVENT_BUS_CAPACITY);

    let audio = AudioController::new(
        Arc::clone(&speech),
        spool,
        audio_output(),
        events.clone(),
        false,
    );
    let session = NarrationSession::new(
        Arc::clone(&chat),
        audio.clone(),
        events.clone(),
        NarrationSettings::from(&config.narration),
    );
    let guide = Arc::new(
        TourGuide::new(
            catalog,
            db,
            session,
            audio.clone(),
            events.clone(),
            config.proximity.mode,
            config.proximity.thresholds(),
        )
        .await
        .context("Failed to restore tour state")?,
    );

    let ctx = AppContext {
        guide,
        chat,
        speech,
        events,
        port,
        root_folder,
    };

    server::run(ctx, shutdown_signal())
        .await
        .context("Server error")?;

    audio.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Speaker output when built with it and a device is present, else the clock
fn audio_output() -> Arc<dyn AudioOutput> {
    #[cfg(feature = "speaker")]
    {
        match polaris_guide::audio::SpeakerOutput::new() {
            Ok(output) => return Arc::new(output),
            Err(e) => warn!("No audio device, narration audio will be timed only: {}", e),
        }
    }
    Arc::new(ClockOutput::new())
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
