//! Gain Stage
//!
//! Linear gain multiplier used for the preamp and for the dry and
//! reverb-wet paths of the mixer. The gain is deliberately unconstrained:
//! the preamp is expected in [0, 2] but nothing enforces it.

use std::sync::Arc;

use crate::param::Param;
use crate::processor::{AudioProcessor, ProcessContext};

pub struct Gain {
    name: &'static str,
    gain: Arc<Param>,
}

impl Gain {
    pub fn new(name: &'static str, initial: f32) -> Self {
        Self {
            name,
            gain: Arc::new(Param::new(initial)),
        }
    }

    /// Shared handle to the gain parameter (control side)
    pub fn param(&self) -> Arc<Param> {
        Arc::clone(&self.gain)
    }
}

impl AudioProcessor for Gain {
    #[inline]
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        let gain = self.gain.get();
        if gain == 1.0 {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample *= gain;
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        self.name
    }
}
