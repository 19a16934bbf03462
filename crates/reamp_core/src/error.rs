//! Engine Error Types

use thiserror::Error;

/// Errors that can occur in the audio engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No audio output device found")]
    NoOutputDevice,

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("Failed to pause audio stream: {0}")]
    StreamPauseError(String),

    #[error("Stream configuration error: {0}")]
    ConfigError(String),

    #[error("Output is not open")]
    OutputNotOpen,

    #[error("Audio engine is not initialized")]
    NotInitialized,

    #[error("Failed to decode track: {0}")]
    DecodeError(String),

    #[error("Failed to resample track: {0}")]
    ResampleError(String),

    #[error("No track loaded")]
    NoTrackLoaded,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DSP error: {0}")]
    DspError(#[from] reamp_dsp::DspError),

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawnError(String),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
