//! # Polaris Tour Guide
//!
//! Location-aware narration for a walking tour:
//! - Narration sessions (scripted reveal, streamed AI answers, cancellation)
//! - Audio playback with a single authoritative clip and exactly-once release
//! - Tour orchestration (location, proximity gate, discoveries)
//! - HTTP control API, SSE events and the chat/speech relay endpoints

pub mod api;
pub mod audio;
pub mod error;
pub mod narration;
pub mod services;
pub mod tour;

pub use error::{ApiError, Error, Result};
pub use tour::{TapOutcome, TourGuide};
