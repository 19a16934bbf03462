//! FFT Spectrum Analyser
//!
//! A non-destructive tap at the end of the signal graph that exposes
//! frequency-magnitude snapshots for visualisation.
//!
//! # Architecture
//!
//! The analyser is split in two halves connected by an SPSC ring buffer:
//!
//! ```text
//! render thread:  ... ──▶ AnalyserTap ──▶ ...        (signal untouched)
//!                              │ rtrb (mono samples)
//!                              ▼
//! control thread:          Analyser::byte_frequency_data()
//!                          (drain, window, FFT, smooth)
//! ```
//!
//! The tap only pushes samples; all FFT work happens on the reader's thread.
//! When nobody reads, the ring fills up and further samples are dropped,
//! which costs nothing on the audio thread.

use std::sync::Arc;

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::processor::{AudioProcessor, ProcessContext};

/// FFT size (must be power of 2)
/// 2048 samples at 48kHz = ~42ms window, ~23Hz resolution
pub const FFT_SIZE: usize = 2048;

/// Number of frequency bins exposed (half the FFT)
pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;

/// Averaging constant between successive snapshots (0 = no smoothing)
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

/// Magnitude mapped to byte 0
pub const MIN_DECIBELS: f32 = -100.0;

/// Magnitude mapped to byte 255
pub const MAX_DECIBELS: f32 = -30.0;

/// Samples the ring buffer can hold between reads
const RING_CAPACITY: usize = FFT_SIZE * 8;

/// Blackman window coefficients (pre-computed)
struct BlackmanWindow {
    coeffs: Vec<f32>,
}

impl BlackmanWindow {
    fn new(size: usize) -> Self {
        let alpha = 0.16_f32;
        let a0 = 0.5 * (1.0 - alpha);
        let a1 = 0.5_f32;
        let a2 = 0.5 * alpha;
        let coeffs = (0..size)
            .map(|i| {
                let x = i as f32 / size as f32;
                a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                    + a2 * (4.0 * std::f32::consts::PI * x).cos()
            })
            .collect();
        Self { coeffs }
    }

    #[inline]
    fn apply(&self, sample: f32, index: usize) -> f32 {
        sample * self.coeffs[index]
    }
}

/// Create a connected tap / analyser pair
pub fn analyser() -> (AnalyserTap, Analyser) {
    let (producer, consumer) = RingBuffer::<f32>::new(RING_CAPACITY);
    (AnalyserTap { producer }, Analyser::new(consumer))
}

/// Render-side half: copies the signal into the ring buffer
pub struct AnalyserTap {
    producer: Producer<f32>,
}

impl AnalyserTap {
    /// Push the mono mix of an interleaved stereo buffer
    ///
    /// # Real-time Safety
    /// No allocations, no locks. Samples that don't fit are dropped.
    #[inline]
    pub fn push_interleaved(&mut self, buffer: &[f32]) {
        for frame in buffer.chunks_exact(2) {
            // Down-mix to mono (average of L+R)
            if self.producer.push((frame[0] + frame[1]) * 0.5).is_err() {
                break;
            }
        }
    }
}

impl AudioProcessor for AnalyserTap {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.push_interleaved(buffer);
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "Analyser"
    }
}

struct AnalyserState {
    consumer: Consumer<f32>,
    /// Most recent FFT_SIZE samples, oldest at `write_pos`
    history: Vec<f32>,
    write_pos: usize,
    window: BlackmanWindow,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Smoothed linear magnitudes
    smoothed: Vec<f32>,
}

impl AnalyserState {
    /// Move pending samples out of the ring; true if any arrived
    fn drain(&mut self) -> bool {
        let available = self.consumer.slots();
        if available == 0 {
            return false;
        }
        if let Ok(chunk) = self.consumer.read_chunk(available) {
            let (first, second) = chunk.as_slices();
            for &sample in first.iter().chain(second.iter()) {
                self.history[self.write_pos] = sample;
                self.write_pos = (self.write_pos + 1) % FFT_SIZE;
            }
            chunk.commit_all();
        }
        true
    }

    /// Window, transform and fold into the smoothed magnitudes
    fn analyse(&mut self) {
        for i in 0..FFT_SIZE {
            // Oldest sample first
            let sample = self.history[(self.write_pos + i) % FFT_SIZE];
            self.buffer[i] = Complex::new(self.window.apply(sample, i), 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / FFT_SIZE as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.buffer) {
            let magnitude = bin.norm() * scale;
            let value = SMOOTHING_TIME_CONSTANT * *smoothed + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
            *smoothed = if value.is_finite() { value } else { 0.0 };
        }
    }
}

/// Control-side half: computes spectra on demand
pub struct Analyser {
    state: Mutex<AnalyserState>,
}

impl Analyser {
    fn new(consumer: Consumer<f32>) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            state: Mutex::new(AnalyserState {
                consumer,
                history: vec![0.0; FFT_SIZE],
                write_pos: 0,
                window: BlackmanWindow::new(FFT_SIZE),
                fft,
                buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
                scratch: vec![Complex::new(0.0, 0.0); scratch_len],
                smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
            }),
        }
    }

    /// Pull new samples and recompute the spectrum if any arrived
    ///
    /// Returns true if the spectrum changed.
    pub fn update(&self) -> bool {
        let mut state = self.state.lock();
        if !state.drain() {
            return false;
        }
        state.analyse();
        true
    }

    /// Latest spectrum in dB, one value per bin
    ///
    /// Fills the first `min(out.len(), FREQUENCY_BIN_COUNT)` entries.
    pub fn float_frequency_data(&self, out: &mut [f32]) {
        self.update();
        let state = self.state.lock();
        for (dst, &magnitude) in out.iter_mut().zip(&state.smoothed) {
            *dst = 20.0 * magnitude.max(f32::MIN_POSITIVE).log10();
        }
    }

    /// Latest spectrum scaled to bytes between MIN_DECIBELS and MAX_DECIBELS
    ///
    /// Fills the first `min(out.len(), FREQUENCY_BIN_COUNT)` entries.
    pub fn byte_frequency_data(&self, out: &mut [u8]) {
        self.update();
        let state = self.state.lock();
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (dst, &magnitude) in out.iter_mut().zip(&state.smoothed) {
            let db = 20.0 * magnitude.max(f32::MIN_POSITIVE).log10();
            let scaled = 255.0 * (db - MIN_DECIBELS) / range;
            *dst = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Forget accumulated samples and smoothing history
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.drain();
        state.history.fill(0.0);
        state.write_pos = 0;
        state.smoothed.fill(0.0);
    }
}
