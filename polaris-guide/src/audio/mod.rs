//! Speech playback
//!
//! - `controller`: the single authoritative playback slot
//! - `resource`: explicitly released clip storage (spool files)
//! - `output`: playback backends behind [`AudioOutput`]
//! - `decode`: symphonia decoding shared by the backends

pub mod controller;
pub mod decode;
pub mod output;
pub mod resource;
#[cfg(feature = "speaker")]
pub mod speaker;

pub use controller::AudioController;
pub use output::{AudioOutput, ClockOutput, PlaybackControl, PlaybackHandle, PlaybackOutcome};
pub use resource::{AudioResource, ResourceStore, SpoolDir};
#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;
