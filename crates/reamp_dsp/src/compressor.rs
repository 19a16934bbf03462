//! Dynamics Compressor
//!
//! Stereo-linked feed-forward compressor with fixed characteristics, used
//! after the panner for loudness consistency and headroom. The settings match
//! the defaults of a browser `DynamicsCompressorNode`, including its
//! automatic makeup gain, and are not adjustable.
//!
//! The current gain reduction is published through a [`Param`] so meters on
//! the control thread can read it.

use std::sync::Arc;

use crate::param::{amplitude_to_db, db_to_amplitude, Param};
use crate::processor::{AudioProcessor, ProcessContext};

pub const THRESHOLD_DB: f32 = -24.0;
pub const KNEE_DB: f32 = 30.0;
pub const RATIO: f32 = 12.0;
pub const ATTACK_SECONDS: f32 = 0.003;
pub const RELEASE_SECONDS: f32 = 0.25;

/// Makeup exponent applied to the reduction at full scale
const MAKEUP_EXPONENT: f32 = 0.6;

/// Calculate smoothing coefficient from time constant
#[inline]
fn time_to_coeff(time_seconds: f32, sample_rate: f32) -> f32 {
    if time_seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_seconds * sample_rate)).exp()
    }
}

/// Static gain computer: dB of reduction for a detector level in dB
#[inline]
fn gain_reduction_db(input_db: f32) -> f32 {
    let half_knee = KNEE_DB / 2.0;
    let below = THRESHOLD_DB - half_knee;
    let above = THRESHOLD_DB + half_knee;

    if input_db <= below {
        0.0
    } else if input_db >= above {
        (input_db - THRESHOLD_DB) * (1.0 - 1.0 / RATIO)
    } else {
        // Quadratic soft knee between the two straight segments
        let x = input_db - below;
        (1.0 - 1.0 / RATIO) * x * x / (2.0 * KNEE_DB)
    }
}

pub struct Compressor {
    attack_coeff: f32,
    release_coeff: f32,
    makeup_db: f32,
    /// Smoothed reduction in dB (positive = attenuating)
    reduction_db: f32,
    reduction: Arc<Param>,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            attack_coeff: time_to_coeff(ATTACK_SECONDS, sample_rate),
            release_coeff: time_to_coeff(RELEASE_SECONDS, sample_rate),
            makeup_db: gain_reduction_db(0.0) * MAKEUP_EXPONENT,
            reduction_db: 0.0,
            reduction: Arc::new(Param::new(0.0)),
        }
    }

    /// Read-only handle to the current gain reduction in dB (<= 0)
    pub fn reduction(&self) -> Arc<Param> {
        Arc::clone(&self.reduction)
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let level = left.abs().max(right.abs());
        let target = gain_reduction_db(amplitude_to_db(level));

        let coeff = if target > self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * target;

        let gain = db_to_amplitude(self.makeup_db - self.reduction_db);
        (left * gain, right * gain)
    }

    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = self.process_frame(frame[0], frame[1]);
            frame[0] = l;
            frame[1] = r;
        }
        self.reduction.set(-self.reduction_db);
    }

    pub fn reset(&mut self) {
        self.reduction_db = 0.0;
        self.reduction.set(0.0);
    }
}

impl AudioProcessor for Compressor {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.process_interleaved(buffer);
    }

    fn reset(&mut self) {
        Compressor::reset(self);
    }

    fn name(&self) -> &'static str {
        "Dynamics Compressor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_output(level: f32) -> (f32, f32) {
        let mut comp = Compressor::new(48000.0);
        let mut buffer = vec![level; 48000 * 2];
        comp.process_interleaved(&mut buffer);
        (buffer[buffer.len() - 2], comp.reduction().get())
    }

    #[test]
    fn test_gain_computer_segments() {
        assert_eq!(gain_reduction_db(-60.0), 0.0);
        // Well above the knee: slope 1 - 1/ratio
        let r = gain_reduction_db(0.0);
        assert!((r - 24.0 * (11.0 / 12.0)).abs() < 1e-4);
        // Knee is continuous at both edges
        assert!(gain_reduction_db(-39.0).abs() < 1e-6);
        let edge = (-9.0 - THRESHOLD_DB) * (1.0 - 1.0 / RATIO);
        assert!((gain_reduction_db(-9.0) - edge).abs() < 1e-4);
    }

    #[test]
    fn test_quiet_signal_only_gets_makeup() {
        let (out, reduction) = steady_output(0.001); // -60dB
        let makeup = db_to_amplitude(gain_reduction_db(0.0) * MAKEUP_EXPONENT);
        assert!((out - 0.001 * makeup).abs() < 1e-5);
        assert!(reduction.abs() < 1e-3);
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let (out, reduction) = steady_output(1.0);
        // 0dBFS input is reduced by ~22dB, makeup restores ~13dB
        assert!(reduction < -20.0, "reduction {}", reduction);
        assert!(out < 1.0, "output {}", out);
    }

    #[test]
    fn test_compression_narrows_dynamic_range() {
        let (quiet, _) = steady_output(0.01);
        let (loud, _) = steady_output(1.0);
        // 40dB of input range comes out much narrower
        let out_range_db = amplitude_to_db(loud) - amplitude_to_db(quiet);
        assert!(out_range_db < 20.0, "range {}dB", out_range_db);
    }

    #[test]
    fn test_reset_clears_reduction() {
        let mut comp = Compressor::new(48000.0);
        let mut buffer = vec![1.0; 4800];
        comp.process_interleaved(&mut buffer);
        assert!(comp.reduction().get() < 0.0);

        comp.reset();
        assert_eq!(comp.reduction().get(), 0.0);
    }
}
