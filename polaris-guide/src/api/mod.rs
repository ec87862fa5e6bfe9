//! HTTP API for the tour guide
//!
//! Control endpoints under `/api/v1`, the SSE event stream, and the
//! `/api/chat` + `/api/tts` relay endpoints used by browser clients.

pub mod handlers;
pub mod relay;
pub mod server;
pub mod sse;

use crate::services::{ChatService, SpeechService};
use crate::tour::TourGuide;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use polaris_common::EventBus;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppContext {
    pub guide: Arc<TourGuide>,
    /// Used directly by the relay endpoints
    pub chat: Arc<dyn ChatService>,
    pub speech: Arc<dyn SpeechService>,
    pub events: EventBus,
    pub port: u16,
    pub root_folder: PathBuf,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))
        // Relay endpoints
        .route("/api/chat", post(relay::chat))
        .route("/api/tts", post(relay::tts))
        .nest(
            "/api/v1",
            Router::new()
                // Catalog and map
                .route("/landmarks", get(handlers::list_landmarks))
                .route("/landmarks/:name/open", post(handlers::open_landmark))
                .route("/markers", get(handlers::get_markers))
                .route(
                    "/location",
                    post(handlers::set_location).delete(handlers::clear_location),
                )
                .route("/mode", get(handlers::get_mode).put(handlers::set_mode))
                // Narration session
                .route("/session", get(handlers::get_session))
                .route("/session/follow-up", post(handlers::ask_follow_up))
                .route("/session/ask", post(handlers::ask_freeform))
                .route("/session/stop", post(handlers::stop_session))
                .route("/session/close", post(handlers::close_session))
                // Persisted flags
                .route("/audio/mute", get(handlers::get_mute).put(handlers::set_mute))
                .route("/intro", get(handlers::get_intro).put(handlers::set_intro))
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Relay endpoints are called cross-origin by the map client
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "polaris-guide",
        "version": env!("CARGO_PKG_VERSION"),
        "port": ctx.port,
        "root_folder": ctx.root_folder,
        "landmarks": ctx.guide.catalog().len(),
    }))
}
