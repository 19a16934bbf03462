//! Synthetic Reverb Impulse Response
//!
//! The reverb kernel is stereo white noise shaped by a polynomial decay:
//!
//! ```text
//! h[c][i] = U(-1, 1) * (1 - i/N)^decay        N = floor(sample_rate * seconds)
//! ```
//!
//! Each channel draws its own noise so the tail decorrelates between left
//! and right, which is what gives the reverb its width.

use rand::Rng;

use crate::error::DspError;

/// Default tail length (seconds)
pub const DEFAULT_DURATION_SECS: f32 = 2.0;

/// Default decay exponent
pub const DEFAULT_DECAY: f32 = 2.0;

// Browser-compatible convolver normalisation constants
const GAIN_CALIBRATION: f32 = 0.001_25; // -58dB
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000_125;

/// Two-channel impulse response, immutable once built
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    channels: [Vec<f32>; 2],
    sample_rate: f32,
}

impl ImpulseResponse {
    /// Generate a decaying-noise impulse response from the thread RNG
    pub fn generate(sample_rate: f32, duration_secs: f32, decay: f32) -> Result<Self, DspError> {
        Self::generate_with_rng(sample_rate, duration_secs, decay, &mut rand::thread_rng())
    }

    /// Generate a decaying-noise impulse response from a caller-supplied RNG
    pub fn generate_with_rng<R: Rng + ?Sized>(
        sample_rate: f32,
        duration_secs: f32,
        decay: f32,
        rng: &mut R,
    ) -> Result<Self, DspError> {
        if !(sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let length = (f64::from(sample_rate) * f64::from(duration_secs.max(0.0))).floor() as usize;
        let envelope = |i: usize| (1.0 - i as f32 / length as f32).powf(decay);

        let left = (0..length)
            .map(|i| rng.gen_range(-1.0_f32..1.0) * envelope(i))
            .collect();
        let right = (0..length)
            .map(|i| rng.gen_range(-1.0_f32..1.0) * envelope(i))
            .collect();

        Ok(Self {
            channels: [left, right],
            sample_rate,
        })
    }

    /// Wrap existing left/right kernels
    pub fn from_channels(sample_rate: f32, left: Vec<f32>, right: Vec<f32>) -> Result<Self, DspError> {
        if !(sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if left.len() != right.len() {
            return Err(DspError::ChannelLengthMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        Ok(Self {
            channels: [left, right],
            sample_rate,
        })
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Kernel for channel 0 (left) or 1 (right)
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Gain that brings the kernel to a consistent loudness
    ///
    /// Same scheme as a browser `ConvolverNode` with `normalize = true`:
    /// inverse RMS power, calibrated to -58dB at 44.1kHz.
    pub fn normalization_scale(&self) -> f32 {
        let total = (self.channels.len() * self.len()) as f32;
        let energy: f32 = self
            .channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|s| s * s)
            .sum();

        let mut power = (energy / total).sqrt();
        if !power.is_finite() || power < MIN_POWER {
            power = MIN_POWER;
        }

        (1.0 / power) * GAIN_CALIBRATION * GAIN_CALIBRATION_SAMPLE_RATE / self.sample_rate
    }
}
