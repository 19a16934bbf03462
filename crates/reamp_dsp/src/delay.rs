//! Feedback Delay
//!
//! A stereo delay line with a feedback path from its output back to its
//! input:
//!
//! ```text
//! in ──▶(+)──▶ [ delay line ] ──┬──▶ out
//!        ▲                      │
//!        └──── feedback gain ◀──┘
//! ```
//!
//! Because the line sits inside a cycle, the effective delay is never
//! shorter than one sample. The feedback gain is used as given; values at or
//! above 1.0 grow without bound.

use std::sync::Arc;

use crate::error::DspError;
use crate::param::Param;
use crate::processor::{AudioProcessor, ProcessContext};

/// Longest delay the line can hold (seconds)
pub const MAX_DELAY_SECONDS: f32 = 5.0;

/// Delay time and feedback, shared with the control thread
#[derive(Debug)]
pub struct DelayParams {
    /// Delay time in seconds
    pub time: Param,
    /// Linear gain of the feedback path
    pub feedback: Param,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            time: Param::new(0.0),
            feedback: Param::new(0.0),
        }
    }
}

pub struct Delay {
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    params: Arc<DelayParams>,
    sample_rate: f32,
}

impl Delay {
    /// Allocate a delay line long enough for `max_delay_seconds`
    pub fn new(sample_rate: f32, max_delay_seconds: f32) -> Result<Self, DspError> {
        if !(sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if !(max_delay_seconds > 0.0) {
            return Err(DspError::InvalidDelayLength(max_delay_seconds));
        }

        // Two extra slots so interpolation at the maximum never reads the
        // sample being written
        let len = (max_delay_seconds * sample_rate).ceil() as usize + 2;

        Ok(Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
            write_pos: 0,
            params: Arc::new(DelayParams::default()),
            sample_rate,
        })
    }

    /// Shared handle to time/feedback (control side)
    pub fn params(&self) -> Arc<DelayParams> {
        Arc::clone(&self.params)
    }

    /// Longest delay in samples this line supports
    pub fn max_delay_samples(&self) -> f32 {
        (self.left.len() - 2) as f32
    }

    /// Delay in samples actually used for a requested time
    #[inline]
    fn delay_samples(&self, seconds: f32) -> f32 {
        let samples = seconds * self.sample_rate;
        if samples.is_nan() {
            return 1.0;
        }
        samples.clamp(1.0, self.max_delay_samples())
    }

    /// Linear-interpolated read `delay` samples behind the write head
    #[inline]
    fn read(line: &[f32], write_pos: usize, delay: f32) -> f32 {
        let len = line.len();
        let whole = delay.floor();
        let frac = delay - whole;
        let whole = whole as usize;

        // Newer sample first, then the one before it
        let newer = (write_pos + len - whole) % len;
        let older = (newer + len - 1) % len;
        line[newer] + (line[older] - line[newer]) * frac
    }

    /// Process an interleaved stereo buffer in-place, replacing the input
    /// with the delay output
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        let delay = self.delay_samples(self.params.time.get());
        let feedback = self.params.feedback.get();
        let len = self.left.len();

        for frame in buffer.chunks_exact_mut(2) {
            let out_l = Self::read(&self.left, self.write_pos, delay);
            let out_r = Self::read(&self.right, self.write_pos, delay);

            self.left[self.write_pos] = frame[0] + out_l * feedback;
            self.right[self.write_pos] = frame[1] + out_r * feedback;
            self.write_pos = (self.write_pos + 1) % len;

            frame[0] = out_l;
            frame[1] = out_r;
        }
    }

    pub fn reset(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
        self.write_pos = 0;
    }
}

impl AudioProcessor for Delay {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.process_interleaved(buffer);
    }

    fn reset(&mut self) {
        Delay::reset(self);
    }

    fn name(&self) -> &'static str {
        "Delay"
    }
}
