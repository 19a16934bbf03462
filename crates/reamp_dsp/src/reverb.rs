//! Convolution Reverb
//!
//! Convolves each channel with the matching channel of an
//! [`ImpulseResponse`] using uniformly partitioned overlap-save convolution:
//!
//! - the kernel is cut into partitions of `PARTITION_SIZE` samples, each
//!   zero-padded to `2 * PARTITION_SIZE` and transformed once up front
//! - every `PARTITION_SIZE` input samples, the last two input blocks are
//!   transformed and pushed into a frequency-domain delay line
//! - the output block is the inverse transform of the sum of
//!   (delayed input spectrum x kernel partition) products
//!
//! Cost per sample is O(partitions) complex multiplies instead of O(kernel
//! length). The price is `PARTITION_SIZE` samples of latency on the wet path.
//! All buffers are allocated in `new()`; processing never allocates.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::DspError;
use crate::impulse::ImpulseResponse;
use crate::processor::{AudioProcessor, ProcessContext};

/// Samples per kernel partition (and wet-path latency)
pub const PARTITION_SIZE: usize = 512;

const FFT_LEN: usize = PARTITION_SIZE * 2;

/// Single-channel partitioned convolver
struct PartitionedConvolver {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// Transformed kernel partitions
    kernel: Vec<Vec<Complex<f32>>>,
    /// Ring of past input spectra, newest at `head`
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Previous block followed by the block being filled
    input: Vec<f32>,
    filled: usize,
    /// Output of the last completed block
    output: Vec<f32>,
    work: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl PartitionedConvolver {
    fn new(kernel: &[f32], scale: f32, planner: &mut FftPlanner<f32>) -> Self {
        let fft = planner.plan_fft_forward(FFT_LEN);
        let ifft = planner.plan_fft_inverse(FFT_LEN);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![Complex::new(0.0, 0.0); scratch_len];

        let kernel: Vec<Vec<Complex<f32>>> = kernel
            .chunks(PARTITION_SIZE)
            .map(|part| {
                let mut spectrum = vec![Complex::new(0.0, 0.0); FFT_LEN];
                for (bin, &s) in spectrum.iter_mut().zip(part) {
                    *bin = Complex::new(s * scale, 0.0);
                }
                fft.process_with_scratch(&mut spectrum, &mut scratch);
                spectrum
            })
            .collect();

        let partitions = kernel.len();
        Self {
            fft,
            ifft,
            kernel,
            history: vec![vec![Complex::new(0.0, 0.0); FFT_LEN]; partitions],
            head: 0,
            input: vec![0.0; FFT_LEN],
            filled: 0,
            output: vec![0.0; PARTITION_SIZE],
            work: vec![Complex::new(0.0, 0.0); FFT_LEN],
            accum: vec![Complex::new(0.0, 0.0); FFT_LEN],
            scratch,
        }
    }

    #[inline]
    fn process_sample(&mut self, sample: f32) -> f32 {
        self.input[PARTITION_SIZE + self.filled] = sample;
        let out = self.output[self.filled];
        self.filled += 1;
        if self.filled == PARTITION_SIZE {
            self.process_block();
            self.filled = 0;
        }
        out
    }

    fn process_block(&mut self) {
        let partitions = self.kernel.len();

        // Transform [previous block | current block]
        for (bin, &s) in self.work.iter_mut().zip(self.input.iter()) {
            *bin = Complex::new(s, 0.0);
        }
        self.fft.process_with_scratch(&mut self.work, &mut self.scratch);

        self.head = (self.head + partitions - 1) % partitions;
        self.history[self.head].copy_from_slice(&self.work);

        // Multiply-accumulate against every kernel partition
        self.accum.fill(Complex::new(0.0, 0.0));
        for (k, partition) in self.kernel.iter().enumerate() {
            let spectrum = &self.history[(self.head + k) % partitions];
            for ((acc, x), h) in self.accum.iter_mut().zip(spectrum).zip(partition) {
                *acc += x * h;
            }
        }
        self.ifft.process_with_scratch(&mut self.accum, &mut self.scratch);

        // Overlap-save: only the second half is free of circular wrap
        let norm = 1.0 / FFT_LEN as f32;
        for (out, bin) in self.output.iter_mut().zip(&self.accum[PARTITION_SIZE..]) {
            *out = bin.re * norm;
        }

        self.input.copy_within(PARTITION_SIZE.., 0);
    }

    fn reset(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.filled = 0;
        self.head = 0;
    }
}

/// Stereo convolution reverb (left with kernel 0, right with kernel 1)
pub struct ConvolutionReverb {
    left: PartitionedConvolver,
    right: PartitionedConvolver,
    kernel_len: usize,
}

impl ConvolutionReverb {
    /// Take ownership of the impulse response and prepare its spectra
    ///
    /// With `normalize` the kernel is scaled by
    /// [`ImpulseResponse::normalization_scale`].
    pub fn new(impulse: ImpulseResponse, normalize: bool) -> Result<Self, DspError> {
        if impulse.is_empty() {
            return Err(DspError::EmptyImpulseResponse);
        }

        let scale = if normalize {
            impulse.normalization_scale()
        } else {
            1.0
        };

        let mut planner = FftPlanner::new();
        Ok(Self {
            left: PartitionedConvolver::new(impulse.channel(0), scale, &mut planner),
            right: PartitionedConvolver::new(impulse.channel(1), scale, &mut planner),
            kernel_len: impulse.len(),
        })
    }

    /// Kernel length in samples
    pub fn kernel_len(&self) -> usize {
        self.kernel_len
    }

    /// Wet-path latency in samples
    pub fn latency(&self) -> usize {
        PARTITION_SIZE
    }

    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        for frame in buffer.chunks_exact_mut(2) {
            frame[0] = self.left.process_sample(frame[0]);
            frame[1] = self.right.process_sample(frame[1]);
        }
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

impl AudioProcessor for ConvolutionReverb {
    fn process(&mut self, buffer: &mut [f32], _context: &ProcessContext) {
        self.process_interleaved(buffer);
    }

    fn reset(&mut self) {
        ConvolutionReverb::reset(self);
    }

    fn name(&self) -> &'static str {
        "Convolution Reverb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_impulse(reverb: &mut ConvolutionReverb, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut buffer = vec![0.0; frames * 2];
        buffer[0] = 1.0;
        buffer[1] = 1.0;
        reverb.process_interleaved(&mut buffer);
        let left = buffer.iter().step_by(2).copied().collect();
        let right = buffer.iter().skip(1).step_by(2).copied().collect();
        (left, right)
    }

    #[test]
    fn test_empty_kernel_rejected() {
        let ir = ImpulseResponse::from_channels(48000.0, vec![], vec![]).unwrap();
        assert!(matches!(
            ConvolutionReverb::new(ir, false),
            Err(DspError::EmptyImpulseResponse)
        ));
    }

    #[test]
    fn test_unit_kernel_delays_by_latency() {
        let ir = ImpulseResponse::from_channels(48000.0, vec![1.0], vec![1.0]).unwrap();
        let mut reverb = ConvolutionReverb::new(ir, false).unwrap();

        let (left, _) = run_impulse(&mut reverb, PARTITION_SIZE * 2);
        assert!((left[PARTITION_SIZE] - 1.0).abs() < 1e-4);
        for (i, s) in left.iter().enumerate() {
            if i != PARTITION_SIZE {
                assert!(s.abs() < 1e-4, "unexpected energy at {}: {}", i, s);
            }
        }
    }

    #[test]
    fn test_kernel_spanning_partitions_matches_direct_convolution() {
        // Kernel longer than two partitions, distinct per channel
        let len = PARTITION_SIZE * 2 + 37;
        let left_kernel: Vec<f32> = (0..len).map(|i| ((i * 7 % 13) as f32 - 6.0) / 10.0).collect();
        let right_kernel: Vec<f32> = (0..len).map(|i| if i % 100 == 0 { 0.5 } else { 0.0 }).collect();
        let ir = ImpulseResponse::from_channels(48000.0, left_kernel.clone(), right_kernel.clone()).unwrap();
        let mut reverb = ConvolutionReverb::new(ir, false).unwrap();

        let (left, right) = run_impulse(&mut reverb, len + PARTITION_SIZE * 2);

        for i in 0..len {
            let l = left[i + PARTITION_SIZE];
            let r = right[i + PARTITION_SIZE];
            assert!((l - left_kernel[i]).abs() < 1e-3, "left {} {} {}", i, l, left_kernel[i]);
            assert!((r - right_kernel[i]).abs() < 1e-3, "right {} {} {}", i, r, right_kernel[i]);
        }
    }

    #[test]
    fn test_normalized_generated_reverb_is_bounded() {
        let ir = ImpulseResponse::generate(8000.0, 0.5, 2.0).unwrap();
        let mut reverb = ConvolutionReverb::new(ir, true).unwrap();

        let mut buffer: Vec<f32> = (0..8000).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
        reverb.process_interleaved(&mut buffer);

        assert!(buffer.iter().all(|s| s.is_finite() && s.abs() < 10.0));
        assert!(buffer.iter().any(|s| s.abs() > 1e-4), "reverb should produce a tail");
    }

    #[test]
    fn test_reset_silences_tail() {
        let ir = ImpulseResponse::from_channels(48000.0, vec![0.5; 600], vec![0.5; 600]).unwrap();
        let mut reverb = ConvolutionReverb::new(ir, false).unwrap();
        run_impulse(&mut reverb, 300);

        reverb.reset();

        let mut silence = vec![0.0; PARTITION_SIZE * 4];
        reverb.process_interleaved(&mut silence);
        assert!(silence.iter().all(|s| s.abs() < 1e-6));
    }
}
