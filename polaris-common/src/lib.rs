//! # Polaris Common Library
//!
//! Shared code for the Polaris tour services including:
//! - Configuration loading and root folder resolution
//! - Geographic math (great-circle distance, slippy-map tiles)
//! - Proximity engine (marker visibility and interaction gate)
//! - Landmark catalog parsing and validation
//! - Event types (PolarisEvent enum) and EventBus
//! - Database initialization and persisted settings

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod geo;
pub mod landmarks;
pub mod proximity;

pub use error::{Error, Result};
pub use geo::Coordinate;
pub use landmarks::{FollowUp, Landmark, LandmarkCatalog};
pub use proximity::{ExplorerMode, MarkerVisibility, ProximityConfig};
pub use events::{
    AudioEndReason, EventBus, MarkerView, NarrationPhase, PolarisEvent, Speaker, TranscriptEntry,
};
