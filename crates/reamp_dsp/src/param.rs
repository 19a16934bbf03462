//! Runtime-Adjustable Parameters
//!
//! Every stage parameter is a single `f32` written by the control thread and
//! read by the render thread. There is no `AtomicF32`, so the value is stored
//! as its bit pattern in an `AtomicU32`. Reads and writes are wait-free and
//! never block the audio callback.

use std::sync::atomic::{AtomicU32, Ordering};

/// A single continuous stage parameter
#[derive(Debug)]
pub struct Param {
    bits: AtomicU32,
}

impl Param {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Current value
    #[inline]
    pub fn get(&self) -> f32 {
        // Relaxed is enough: each parameter is independent and the
        // render thread only needs to observe the latest write eventually
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Replace the value
    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for Param {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Convert decibels to linear amplitude
#[inline]
pub(crate) fn db_to_amplitude(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at -96dB
#[inline]
pub(crate) fn amplitude_to_db(amp: f32) -> f32 {
    if amp <= 0.0 {
        -96.0
    } else {
        20.0 * amp.log10()
    }
}
