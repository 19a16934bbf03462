//! Stereo Panner
//!
//! Equal-power panning of a stereo signal. Panning left folds part of the
//! right channel into the left one (and vice versa), so nothing is simply
//! discarded. The stored pan value is whatever the caller set; the gain law
//! clamps it to [-1, 1] when rendering.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use crate::param::Param;
use crate::processor::{AudioProcessor, ProcessContext};

pub struct StereoPanner {
    pan: Arc<Param>,
}

impl StereoPanner {
    /// Centered panner
    pub fn new() -> Self {
        Self {
            pan: Arc::new(Param::new(0.0)),
        }
    }

    /// Shared handle to the pan position (control side)
    pub fn param(&self) -> Arc<Param> {
        Arc::clone(&self.pan)
    }

    /// Gains for one pan position: (left-in -> left-out, right-in -> left-out,
    /// left-in -> right-out, right-in -> right-out)
    #[inline]
    fn matrix(pan: f32) -> (f32, f32, f32, f32) {
        let pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) };

        if pan <= 0.0 {
            // Right channel is spread into the left
            let x = (pan + 1.0) * FRAC_PI_2;
            (1.0, x.cos(), 0.0, x.sin())
        } else {
            // Left channel is spread into the right
            let x = pan * FRAC_PI_2;
            (x.cos(), 0.0, x.sin(), 1.0)
        }
    }

    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        let (ll, rl, lr, rr) = Self::matrix(self.pan.get());
        for frame in buffer.chunks_exact_mut(2) {
            let (l, r) = (frame[0], frame[1]);
            frame[0] = l * ll + r * rl;
            frame[1] = l * lr + r * rr;
        }
    }
}

impl Default for StereoPanner {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessor for StereoPanner {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.process_interleaved(buffer);
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "Stereo Panner"
    }
}
