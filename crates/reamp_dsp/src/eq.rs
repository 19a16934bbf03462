//! 10-Band Graphic Equalizer
//!
//! A serial cascade of peaking BiQuad filters at fixed octave centres.
//! Based on the RBJ (Robert Bristow-Johnson) Audio EQ Cookbook.
//!
//! Band gains live in [`EqParams`], shared between the control thread (which
//! writes them) and the render thread. The render side notices changed gains
//! at the start of each block and recomputes only the affected coefficients.

use std::sync::Arc;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::error::DspError;
use crate::param::Param;
use crate::processor::{AudioProcessor, ProcessContext};

/// Number of EQ bands
pub const NUM_BANDS: usize = 10;

/// Band centre frequencies (Hz) - ISO standard octave centers
pub const EQ_BANDS: [f32; NUM_BANDS] = [
    31.0,    // Sub-bass
    62.0,    // Bass
    125.0,   // Low-mid
    250.0,   // Mid
    500.0,   // Mid
    1000.0,  // Upper-mid
    2000.0,  // Presence
    4000.0,  // Brilliance
    8000.0,  // High
    16000.0, // Air
];

/// Quality factor shared by every band
pub const EQ_Q: f32 = 1.4;

/// Identity filter used for bands that cannot be realised at this sample rate
const PASSTHROUGH: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

/// Single EQ band configuration
#[derive(Debug, Clone, Copy)]
pub struct Band {
    pub frequency: f32,
    pub gain_db: f32,
    pub q: f32,
}

impl Band {
    pub fn new(frequency: f32, gain_db: f32) -> Self {
        Self {
            frequency,
            gain_db,
            q: EQ_Q,
        }
    }

    /// Generate peaking BiQuad coefficients for this band
    fn to_coefficients(self, sample_rate: f32) -> Result<Coefficients<f32>, DspError> {
        let invalid = DspError::InvalidCoefficients {
            frequency: self.frequency,
            sample_rate,
        };
        if !self.gain_db.is_finite() {
            return Err(invalid);
        }

        // biquad takes the peaking gain in dB and fails above Nyquist
        Coefficients::<f32>::from_params(
            Type::PeakingEQ(self.gain_db),
            sample_rate.hz(),
            self.frequency.hz(),
            self.q,
        )
        .map_err(|_| invalid)
    }
}

/// Band gains shared between control and render threads
#[derive(Debug)]
pub struct EqParams {
    gains: [Param; NUM_BANDS],
}

impl EqParams {
    /// Flat response (0dB on every band)
    pub fn new() -> Self {
        Self {
            gains: core::array::from_fn(|_| Param::new(0.0)),
        }
    }

    /// Set the gain of one band in dB (not clamped)
    pub fn set_gain(&self, band: usize, gain_db: f32) -> Result<(), DspError> {
        let param = self
            .gains
            .get(band)
            .ok_or(DspError::InvalidBandIndex(band))?;
        param.set(gain_db);
        Ok(())
    }

    pub fn gain(&self, band: usize) -> Option<f32> {
        self.gains.get(band).map(Param::get)
    }

    /// Snapshot of all band gains
    pub fn gains(&self) -> [f32; NUM_BANDS] {
        core::array::from_fn(|i| self.gains[i].get())
    }
}

impl Default for EqParams {
    fn default() -> Self {
        Self::new()
    }
}

/// The equalizer stage
///
/// Designed for real-time use: no allocations in `process()`.
pub struct Equalizer {
    // Each channel needs its own filter state
    filters_left: [DirectForm2Transposed<f32>; NUM_BANDS],
    filters_right: [DirectForm2Transposed<f32>; NUM_BANDS],
    /// Gains the current coefficients were computed from
    applied_gains: [f32; NUM_BANDS],
    params: Arc<EqParams>,
    sample_rate: f32,
}

impl Equalizer {
    /// Create a new equalizer with flat response
    pub fn new(sample_rate: f32) -> Result<Self, DspError> {
        if !(sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let params = Arc::new(EqParams::new());
        let applied_gains = params.gains();
        let coeffs: [Coefficients<f32>; NUM_BANDS] = core::array::from_fn(|i| {
            Band::new(EQ_BANDS[i], applied_gains[i])
                .to_coefficients(sample_rate)
                .unwrap_or(PASSTHROUGH)
        });

        Ok(Self {
            filters_left: core::array::from_fn(|i| DirectForm2Transposed::<f32>::new(coeffs[i])),
            filters_right: core::array::from_fn(|i| DirectForm2Transposed::<f32>::new(coeffs[i])),
            applied_gains,
            params,
            sample_rate,
        })
    }

    /// Shared handle to the band gains (control side)
    pub fn params(&self) -> Arc<EqParams> {
        Arc::clone(&self.params)
    }

    /// Pick up band gains changed since the last block
    ///
    /// # Real-time Safety
    /// Only touches coefficients of bands whose gain changed.
    #[inline]
    fn sync_params(&mut self) {
        for i in 0..NUM_BANDS {
            let gain_db = self.params.gains[i].get();
            if gain_db.to_bits() == self.applied_gains[i].to_bits() {
                continue;
            }
            let coeffs = Band::new(EQ_BANDS[i], gain_db)
                .to_coefficients(self.sample_rate)
                .unwrap_or(PASSTHROUGH);
            self.filters_left[i].update_coefficients(coeffs);
            self.filters_right[i].update_coefficients(coeffs);
            self.applied_gains[i] = gain_db;
        }
    }

    /// Process a stereo sample pair through the EQ cascade
    #[inline]
    pub fn process_sample(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mut l = left;
        let mut r = right;

        for i in 0..NUM_BANDS {
            l = self.filters_left[i].run(l);
            r = self.filters_right[i].run(r);
        }

        (l, r)
    }

    /// Process an interleaved stereo buffer in-place
    ///
    /// Buffer format: [L0, R0, L1, R1, L2, R2, ...]
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        self.sync_params();
        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = self.process_sample(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Reset filter state (clear delay lines)
    pub fn reset(&mut self) {
        for i in 0..NUM_BANDS {
            self.filters_left[i].reset_state();
            self.filters_right[i].reset_state();
        }
    }
}

impl AudioProcessor for Equalizer {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.process_interleaved(buffer);
    }

    fn reset(&mut self) {
        Equalizer::reset(self);
    }

    fn name(&self) -> &'static str {
        "10-Band Equalizer"
    }
}
