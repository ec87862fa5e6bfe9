//! HTTP request handlers for tour control

use crate::api::AppContext;
use crate::error::{ApiError, ApiResult};
use crate::narration::{Dispatch, SessionSnapshot};
use crate::tour::TapOutcome;
use axum::{
    extract::{Path, State},
    Json,
};
use polaris_common::{Coordinate, ExplorerMode, MarkerView};
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LandmarkSummary {
    name: String,
    coordinate: Coordinate,
    image: Option<String>,
    discovered: bool,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeBody {
    mode: ExplorerMode,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    question: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    text: String,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    dispatch: Dispatch,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MuteBody {
    muted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntroBody {
    has_seen_intro: bool,
}

fn status(s: &str) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: s.to_string(),
    })
}

// ============================================================================
// Catalog and Map
// ============================================================================

/// GET /api/v1/landmarks
pub async fn list_landmarks(State(ctx): State<AppContext>) -> Json<Vec<LandmarkSummary>> {
    let guide = &ctx.guide;
    Json(
        guide
            .catalog()
            .iter()
            .map(|l| LandmarkSummary {
                name: l.name.clone(),
                coordinate: l.coordinate,
                image: l.image.clone(),
                discovered: guide.is_discovered(&l.name),
            })
            .collect(),
    )
}

/// GET /api/v1/markers
pub async fn get_markers(State(ctx): State<AppContext>) -> Json<Vec<MarkerView>> {
    Json(ctx.guide.markers())
}

/// POST /api/v1/location - new location sample
pub async fn set_location(
    State(ctx): State<AppContext>,
    Json(req): Json<LocationRequest>,
) -> ApiResult<Json<Vec<MarkerView>>> {
    let coordinate = Coordinate::new(req.lat, req.lng)?;
    Ok(Json(ctx.guide.update_location(Some(coordinate))))
}

/// DELETE /api/v1/location - geolocation unavailable
pub async fn clear_location(State(ctx): State<AppContext>) -> Json<Vec<MarkerView>> {
    Json(ctx.guide.update_location(None))
}

/// GET /api/v1/mode
pub async fn get_mode(State(ctx): State<AppContext>) -> Json<ModeBody> {
    Json(ModeBody {
        mode: ctx.guide.mode(),
    })
}

/// PUT /api/v1/mode
pub async fn set_mode(
    State(ctx): State<AppContext>,
    Json(req): Json<ModeBody>,
) -> Json<Vec<MarkerView>> {
    Json(ctx.guide.set_mode(req.mode))
}

/// POST /api/v1/landmarks/:name/open - tap a marker
///
/// An out-of-reach landmark is not an error; the outcome says `too_far`.
pub async fn open_landmark(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<TapOutcome>> {
    let outcome = ctx.guide.tap(&name).await?;
    info!(landmark = %name, ?outcome, "Marker tapped");
    Ok(Json(outcome))
}

// ============================================================================
// Narration Session
// ============================================================================

/// GET /api/v1/session
pub async fn get_session(State(ctx): State<AppContext>) -> Json<SessionSnapshot> {
    Json(ctx.guide.session().snapshot())
}

fn dispatched(dispatch: Dispatch) -> ApiResult<Json<DispatchResponse>> {
    match dispatch {
        Dispatch::Rejected => Err(ApiError::Conflict(
            "narration in progress; stop it before asking".to_string(),
        )),
        dispatch => Ok(Json(DispatchResponse { dispatch })),
    }
}

/// POST /api/v1/session/follow-up
pub async fn ask_follow_up(
    State(ctx): State<AppContext>,
    Json(req): Json<FollowUpRequest>,
) -> ApiResult<Json<DispatchResponse>> {
    dispatched(ctx.guide.session().ask_follow_up(&req.question)?)
}

/// POST /api/v1/session/ask - free-form question
pub async fn ask_freeform(
    State(ctx): State<AppContext>,
    Json(req): Json<AskRequest>,
) -> ApiResult<Json<DispatchResponse>> {
    dispatched(ctx.guide.session().send_freeform(&req.text)?)
}

/// POST /api/v1/session/stop
pub async fn stop_session(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.guide.session().stop();
    status("ok")
}

/// POST /api/v1/session/close - leave the landmark
pub async fn close_session(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    if ctx.guide.back() {
        status("closed")
    } else {
        status("idle")
    }
}

// ============================================================================
// Persisted Flags
// ============================================================================

/// GET /api/v1/audio/mute
pub async fn get_mute(State(ctx): State<AppContext>) -> Json<MuteBody> {
    Json(MuteBody {
        muted: ctx.guide.is_muted(),
    })
}

/// PUT /api/v1/audio/mute
pub async fn set_mute(
    State(ctx): State<AppContext>,
    Json(req): Json<MuteBody>,
) -> ApiResult<Json<MuteBody>> {
    ctx.guide.set_muted(req.muted).await?;
    Ok(Json(MuteBody { muted: req.muted }))
}

/// GET /api/v1/intro
pub async fn get_intro(State(ctx): State<AppContext>) -> Json<IntroBody> {
    Json(IntroBody {
        has_seen_intro: ctx.guide.has_seen_intro(),
    })
}

/// PUT /api/v1/intro
pub async fn set_intro(
    State(ctx): State<AppContext>,
    Json(req): Json<IntroBody>,
) -> ApiResult<Json<IntroBody>> {
    ctx.guide.set_has_seen_intro(req.has_seen_intro).await?;
    Ok(Json(IntroBody {
        has_seen_intro: req.has_seen_intro,
    }))
}
