//! Tour orchestration
//!
//! Ties location samples, the proximity engine and the persisted discovery
//! set to the narration session: every location, mode or discovery change
//! recomputes the marker set, and a tap on a marker passes the interaction
//! gate before a session opens.

use crate::audio::AudioController;
use crate::error::Result;
use crate::narration::{NarrationSession, OpenOutcome};
use chrono::Utc;
use polaris_common::db::settings;
use polaris_common::proximity::{can_interact, compute_visibility};
use polaris_common::{
    Coordinate, EventBus, ExplorerMode, LandmarkCatalog, MarkerView, PolarisEvent,
    ProximityConfig,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Result of tapping a marker
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TapOutcome {
    Opened { resumed: bool },
    AlreadyOpen,
    /// Outside the interaction radius; nothing happened
    TooFar { distance_m: Option<f64> },
}

struct TourState {
    mode: ExplorerMode,
    location: Option<Coordinate>,
    discovered: HashSet<String>,
    muted: bool,
    has_seen_intro: bool,
}

pub struct TourGuide {
    catalog: Arc<LandmarkCatalog>,
    db: SqlitePool,
    session: NarrationSession,
    audio: AudioController,
    events: EventBus,
    proximity: ProximityConfig,
    state: Mutex<TourState>,
}

impl TourGuide {
    /// Restore persisted state and apply the mute flag to `audio`
    pub async fn new(
        catalog: Arc<LandmarkCatalog>,
        db: SqlitePool,
        session: NarrationSession,
        audio: AudioController,
        events: EventBus,
        mode: ExplorerMode,
        proximity: ProximityConfig,
    ) -> Result<Self> {
        let discovered = settings::load_discovered(&db).await?;
        let muted = settings::get_muted(&db).await?;
        let has_seen_intro = settings::get_has_seen_intro(&db).await?;

        info!(
            landmarks = catalog.len(),
            discovered = discovered.len(),
            muted,
            %mode,
            "Tour state restored"
        );
        audio.set_muted(muted);

        Ok(Self {
            catalog,
            db,
            session,
            audio,
            events,
            proximity,
            state: Mutex::new(TourState {
                mode,
                location: None,
                discovered,
                muted,
                has_seen_intro,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TourState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn catalog(&self) -> &LandmarkCatalog {
        &self.catalog
    }

    pub fn session(&self) -> &NarrationSession {
        &self.session
    }

    pub fn audio(&self) -> &AudioController {
        &self.audio
    }

    /// Current marker set
    pub fn markers(&self) -> Vec<MarkerView> {
        let state = self.lock();
        self.markers_locked(&state)
    }

    fn markers_locked(&self, state: &TourState) -> Vec<MarkerView> {
        self.catalog
            .iter()
            .map(|landmark| {
                let discovered = state.discovered.contains(&landmark.name);
                let visibility = compute_visibility(
                    &landmark.coordinate,
                    discovered,
                    state.location.as_ref(),
                    state.mode,
                    &self.proximity,
                );
                let interactive =
                    can_interact(visibility.distance_m, discovered, state.mode, &self.proximity);
                MarkerView {
                    name: landmark.name.clone(),
                    coordinate: landmark.coordinate,
                    image: landmark.image.clone(),
                    discovered,
                    interactive,
                    visibility,
                }
            })
            .collect()
    }

    fn broadcast_markers(&self, markers: Vec<MarkerView>) {
        self.events.emit_lossy(PolarisEvent::MarkersUpdated {
            markers,
            timestamp: Utc::now(),
        });
    }

    /// Record a location sample; `None` when geolocation is unavailable
    pub fn update_location(&self, location: Option<Coordinate>) -> Vec<MarkerView> {
        let markers = {
            let mut state = self.lock();
            state.location = location;
            self.markers_locked(&state)
        };
        debug!(?location, "Location updated");
        self.broadcast_markers(markers.clone());
        markers
    }

    pub fn location(&self) -> Option<Coordinate> {
        self.lock().location
    }

    pub fn set_mode(&self, mode: ExplorerMode) -> Vec<MarkerView> {
        let markers = {
            let mut state = self.lock();
            state.mode = mode;
            self.markers_locked(&state)
        };
        info!(%mode, "Explorer mode changed");
        self.broadcast_markers(markers.clone());
        markers
    }

    pub fn mode(&self) -> ExplorerMode {
        self.lock().mode
    }

    pub fn is_discovered(&self, name: &str) -> bool {
        self.lock().discovered.contains(name)
    }

    /// Tap a marker
    ///
    /// Passing the gate marks the landmark discovered (persisted on first
    /// discovery) and opens its narration session.
    pub async fn tap(&self, name: &str) -> Result<TapOutcome> {
        let landmark = self.catalog.require(name)?;

        let (first_discovery, markers) = {
            let mut state = self.lock();
            let discovered = state.discovered.contains(&landmark.name);
            let distance_m = state
                .location
                .as_ref()
                .map(|u| u.distance_to(&landmark.coordinate));

            if !can_interact(distance_m, discovered, state.mode, &self.proximity) {
                debug!(landmark = %landmark.name, ?distance_m, "Landmark out of reach");
                return Ok(TapOutcome::TooFar { distance_m });
            }

            if discovered {
                (false, None)
            } else {
                state.discovered.insert(landmark.name.clone());
                (true, Some(self.markers_locked(&state)))
            }
        };

        if first_discovery {
            if let Err(e) = settings::insert_discovered(&self.db, &landmark.name).await {
                warn!(landmark = %landmark.name, "Failed to persist discovery: {}", e);
            }
            info!(landmark = %landmark.name, "Landmark discovered");
            self.events.emit_lossy(PolarisEvent::LandmarkDiscovered {
                landmark: landmark.name.clone(),
                timestamp: Utc::now(),
            });
        }
        if let Some(markers) = markers {
            self.broadcast_markers(markers);
        }

        Ok(match self.session.open(landmark) {
            OpenOutcome::Opened { resumed } => TapOutcome::Opened { resumed },
            OpenOutcome::AlreadyOpen => TapOutcome::AlreadyOpen,
        })
    }

    /// Leave the open landmark
    pub fn back(&self) -> bool {
        self.session.close()
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    /// Apply the mute flag to the playing clip and persist it
    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        self.lock().muted = muted;
        self.audio.set_muted(muted);
        self.events.emit_lossy(PolarisEvent::MuteChanged {
            muted,
            timestamp: Utc::now(),
        });
        settings::set_muted(&self.db, muted).await?;
        Ok(())
    }

    pub fn has_seen_intro(&self) -> bool {
        self.lock().has_seen_intro
    }

    pub async fn set_has_seen_intro(&self, seen: bool) -> Result<()> {
        self.lock().has_seen_intro = seen;
        settings::set_has_seen_intro(&self.db, seen).await?;
        Ok(())
    }
}
