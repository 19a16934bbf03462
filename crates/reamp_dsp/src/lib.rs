//! Reamp DSP - Digital Signal Processing Module
//!
//! This crate provides the effect stages of the Reamp signal graph:
//! - 10-band peaking equalizer using BiQuad filters
//! - Feedback delay line with fractional read position
//! - Partitioned FFT convolution reverb with a synthetic impulse response
//! - Equal-power stereo panner
//! - Fixed-curve dynamics compressor
//! - FFT spectrum analyser for real-time visualisation
//!
//! # Architecture
//!
//! Every stage follows a strict "no allocation in audio callback" rule.
//! User-facing parameters live in [`Param`] cells shared between the control
//! thread and the render thread; stages read them once per buffer.

mod analyser;
mod compressor;
mod delay;
mod eq;
mod error;
mod gain;
mod impulse;
mod panner;
mod param;
mod presets;
mod processor;
mod reverb;

pub use analyser::{
    analyser, Analyser, AnalyserTap, FFT_SIZE, FREQUENCY_BIN_COUNT, MAX_DECIBELS, MIN_DECIBELS,
    SMOOTHING_TIME_CONSTANT,
};
pub use compressor::Compressor;
pub use delay::{Delay, DelayParams, MAX_DELAY_SECONDS};
pub use eq::{Band, EqParams, Equalizer, EQ_BANDS, EQ_Q, NUM_BANDS};
pub use error::DspError;
pub use gain::Gain;
pub use impulse::{ImpulseResponse, DEFAULT_DECAY, DEFAULT_DURATION_SECS};
pub use panner::StereoPanner;
pub use param::Param;
pub use presets::{find_preset, Preset, PRESETS};
pub use processor::{AudioProcessor, ProcessContext, ProcessorChain};
pub use reverb::{ConvolutionReverb, PARTITION_SIZE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let _params = EqParams::default();
        let _eq = Equalizer::new(48000.0).unwrap();
        let _delay = Delay::new(48000.0, MAX_DELAY_SECONDS).unwrap();
        let _panner = StereoPanner::default();
        assert_eq!(PRESETS.len(), 5);
    }
}
