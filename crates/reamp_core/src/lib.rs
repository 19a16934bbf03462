//! Reamp Core - Audio Engine
//!
//! This crate provides the playback side of Reamp:
//! - A fixed effects graph (EQ, delay, reverb, panner, compressor, analyser)
//! - The engine that owns it and exposes every parameter as an atomic store
//! - A decoding transport on its own thread
//! - The player that binds playlist, transport and engine together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Thread                         │
//! │   Player ──▶ AudioEngine (setters)    Player ◀── callbacks  │
//! └─────────────────────────────────────────────────────────────┘
//!        │ crossbeam-channel                 ▲
//!        ▼                                   │ TransportEvent
//! ┌──────────────────────┐                   │
//! │   reamp-transport    │───────────────────┘
//! │ decode ▶ resample    │
//! └──────────────────────┘
//!        │ rtrb (SourceStream)
//!        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Output Callback                        │
//! │   source ▶ preamp ▶ EQ ▶ dry/delay/reverb ▶ pan ▶ comp ▶ out │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod decoder;
mod engine;
mod error;
mod graph;
mod message;
mod output;
mod player;
mod playlist;
mod resample;
mod source;
mod stream;
mod transport;

pub use config::{EffectsConfig, EngineConfig, StreamConfig};
pub use decoder::TrackDecoder;
pub use engine::{AudioEngine, EngineState};
pub use error::{EngineError, EngineResult};
pub use graph::{GraphParams, GraphRenderer, NodeId, SignalGraph, CONNECTIONS};
pub use message::{Command, PlaybackState, TrackEvent, TransportEvent};
pub use output::{AudioOutput, OfflineClock, OfflineOutput};
pub use player::Player;
pub use playlist::{Playlist, Track};
pub use source::{source_channel, SourceStream, SourceWriter};
pub use stream::CpalOutput;
pub use transport::{DecoderTransport, Transport, TIME_UPDATE_INTERVAL};

// Re-export DSP types for convenience
pub use reamp_dsp::{find_preset, ImpulseResponse, Preset, EQ_BANDS, FREQUENCY_BIN_COUNT, NUM_BANDS, PRESETS};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let _config = EngineConfig::default();
        let engine = AudioEngine::new(EngineConfig::default(), OfflineOutput::new());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(CONNECTIONS.len(), 25);
    }
}
