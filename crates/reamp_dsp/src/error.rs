//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while building DSP stages
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Invalid band index: {0} (must be 0-9)")]
    InvalidBandIndex(usize),

    #[error("Invalid filter coefficients for frequency {frequency}Hz at sample rate {sample_rate}Hz")]
    InvalidCoefficients { frequency: f32, sample_rate: f32 },

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("Maximum delay must be positive, got {0}s")]
    InvalidDelayLength(f32),

    #[error("Impulse response is empty")]
    EmptyImpulseResponse,

    #[error("Impulse response channels differ in length: left {left}, right {right}")]
    ChannelLengthMismatch { left: usize, right: usize },
}
