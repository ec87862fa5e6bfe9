//! Event types and broadcast bus
//!
//! Everything a client needs to mirror the tour state (markers, transcript
//! growth, audio lifecycle) is published as a [`PolarisEvent`]. The HTTP layer
//! forwards the bus to Server-Sent Events.

use crate::geo::Coordinate;
use crate::proximity::MarkerVisibility;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Narrator,
}

/// One line of the conversation with the narrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn narrator(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Narrator,
            text: text.into(),
        }
    }
}

/// Narration session phase; at most one producer of transcript text runs at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationPhase {
    #[default]
    Idle,
    RevealingScripted,
    StreamingAnswer,
}

impl NarrationPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, NarrationPhase::Idle)
    }
}

/// Why an audio clip stopped being authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEndReason {
    /// Played to the end
    Ended,
    /// Output reported a playback error
    Failed,
    /// Replaced by a newer clip
    Superseded,
    /// Explicit stop or teardown
    Stopped,
}

/// Marker as rendered by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerView {
    pub name: String,
    pub coordinate: Coordinate,
    pub image: Option<String>,
    pub discovered: bool,
    /// A tap would open a session
    pub interactive: bool,
    #[serde(flatten)]
    pub visibility: MarkerVisibility,
}

/// Polaris event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolarisEvent {
    /// A narration session opened for a landmark
    SessionOpened {
        landmark: String,
        /// History from an earlier visit was restored
        resumed: bool,
        timestamp: DateTime<Utc>,
    },

    /// The session for a landmark was torn down
    SessionClosed {
        landmark: String,
        timestamp: DateTime<Utc>,
    },

    PhaseChanged {
        landmark: String,
        phase: NarrationPhase,
        timestamp: DateTime<Utc>,
    },

    /// New transcript entry (narrator entries usually start empty)
    TranscriptEntryAdded {
        landmark: String,
        index: usize,
        entry: TranscriptEntry,
        timestamp: DateTime<Utc>,
    },

    /// Text appended to an existing entry
    TranscriptDelta {
        landmark: String,
        index: usize,
        delta: String,
        timestamp: DateTime<Utc>,
    },

    /// Entry content replaced wholesale (error fill)
    TranscriptEntryReplaced {
        landmark: String,
        index: usize,
        text: String,
        timestamp: DateTime<Utc>,
    },

    AudioStarted {
        generation: u64,
        cache_hit: bool,
        muted: bool,
        timestamp: DateTime<Utc>,
    },

    AudioFinished {
        generation: u64,
        reason: AudioEndReason,
        timestamp: DateTime<Utc>,
    },

    /// Full marker set after a location, mode or discovery change
    MarkersUpdated {
        markers: Vec<MarkerView>,
        timestamp: DateTime<Utc>,
    },

    /// First-ever discovery of a landmark
    LandmarkDiscovered {
        landmark: String,
        timestamp: DateTime<Utc>,
    },

    MuteChanged {
        muted: bool,
        timestamp: DateTime<Utc>,
    },
}

impl PolarisEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PolarisEvent::SessionOpened { .. } => "SessionOpened",
            PolarisEvent::SessionClosed { .. } => "SessionClosed",
            PolarisEvent::PhaseChanged { .. } => "PhaseChanged",
            PolarisEvent::TranscriptEntryAdded { .. } => "TranscriptEntryAdded",
            PolarisEvent::TranscriptDelta { .. } => "TranscriptDelta",
            PolarisEvent::TranscriptEntryReplaced { .. } => "TranscriptEntryReplaced",
            PolarisEvent::AudioStarted { .. } => "AudioStarted",
            PolarisEvent::AudioFinished { .. } => "AudioFinished",
            PolarisEvent::MarkersUpdated { .. } => "MarkersUpdated",
            PolarisEvent::LandmarkDiscovered { .. } => "LandmarkDiscovered",
            PolarisEvent::MuteChanged { .. } => "MuteChanged",
        }
    }
}

/// Broadcast bus for [`PolarisEvent`]s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PolarisEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PolarisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns the number of subscribers reached, or the event back when
    /// nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PolarisEvent,
    ) -> Result<usize, broadcast::error::SendError<PolarisEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PolarisEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PolarisEvent::TranscriptDelta {
            landmark: "Widener Library".to_string(),
            index: 0,
            delta: "H".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TranscriptDelta");
        assert_eq!(json["landmark"], "Widener Library");
        assert_eq!(event.event_type(), "TranscriptDelta");
    }

    #[test]
    fn test_phase_and_reason_wire_names() {
        assert_eq!(
            serde_json::to_value(NarrationPhase::RevealingScripted).unwrap(),
            "revealing_scripted"
        );
        assert_eq!(serde_json::to_value(AudioEndReason::Superseded).unwrap(), "superseded");
        assert_eq!(serde_json::to_value(Speaker::Narrator).unwrap(), "narrator");
    }

    #[test]
    fn test_marker_view_flattens_visibility() {
        let marker = MarkerView {
            name: "John Harvard Statue".to_string(),
            coordinate: Coordinate { lat: 42.3744, lng: -71.1167 },
            image: None,
            discovered: false,
            interactive: true,
            visibility: MarkerVisibility {
                distance_m: Some(12.0),
                opacity: 1.0,
                blur_px: 0.0,
                visible: true,
            },
        };
        let json = serde_json::to_value(&marker).unwrap();
        assert_eq!(json["visible"], true);
        assert_eq!(json["distance_m"], 12.0);
    }

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscribers() {
        let bus = EventBus::new(16);
        assert!(bus
            .emit(PolarisEvent::MuteChanged {
                muted: true,
                timestamp: Utc::now()
            })
            .is_err());

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.emit_lossy(PolarisEvent::MuteChanged {
            muted: false,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PolarisEvent::MuteChanged { muted, .. } => assert!(!muted),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
