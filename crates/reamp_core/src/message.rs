//! Message Types for Thread Communication
//!
//! Commands flow from the control thread -> transport thread
//! Events flow from the transport thread -> control thread

use serde::{Deserialize, Serialize};

use crate::decoder::TrackDecoder;
use crate::source::SourceWriter;

/// Commands sent from the control thread to the transport worker
#[derive(Debug)]
pub enum Command {
    /// Start feeding decoded audio into this writer at the given rate
    Attach { writer: SourceWriter, sample_rate: u32 },

    /// Replace the current track with an opened one (stays paused)
    ///
    /// Events produced for it carry `generation`.
    Load {
        decoder: Box<TrackDecoder>,
        generation: u64,
    },

    /// Start or resume decoding
    Play,

    /// Pause decoding and output
    Pause,

    /// Jump to a position in seconds
    Seek(f64),

    /// Shutdown the worker
    Shutdown,
}

/// Events sent from the transport to the control thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TransportEvent {
    /// A track was opened; duration is known for most containers
    Loaded { duration: Option<f64> },

    /// Playback position advanced (seconds)
    TimeUpdate { position: f64 },

    /// The current track played to its end
    Ended,

    /// Error occurred
    Error { message: String },
}

impl TransportEvent {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        TransportEvent::Error {
            message: err.to_string(),
        }
    }
}

/// A transport event stamped with the track load it belongs to
///
/// The generation goes up on every track change, so events still queued
/// from an earlier track can be told apart from the current one's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

impl TrackEvent {
    pub fn new(generation: u64, event: TransportEvent) -> Self {
        Self { generation, event }
    }
}

/// Transport-facing playback state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    NoTrack,
    Loading,
    Playing,
    Paused,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = TransportEvent::TimeUpdate { position: 1.25 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("TimeUpdate"));

        let deserialized: TransportEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_unit_event_serialization() {
        let json = serde_json::to_string(&TransportEvent::Ended).unwrap();
        assert_eq!(json, r#"{"type":"Ended"}"#);
    }

    #[test]
    fn test_track_event_serialization() {
        let event = TrackEvent::new(3, TransportEvent::Ended);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"generation":3,"event":{"type":"Ended"}}"#);
    }

    #[test]
    fn test_error_event() {
        let event = TransportEvent::error("Test error message");
        if let TransportEvent::Error { message } = event {
            assert_eq!(message, "Test error message");
        } else {
            panic!("Should be Error variant");
        }
    }

    #[test]
    fn test_playback_state_serialization() {
        let json = serde_json::to_string(&PlaybackState::Paused).unwrap();
        let state: PlaybackState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, PlaybackState::Paused);
    }
}
