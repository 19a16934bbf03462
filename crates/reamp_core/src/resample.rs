//! Streaming Sample Rate Conversion
//!
//! Wraps rubato's `FftFixedIn` so the transport can push decoded packets of
//! any size and get interleaved stereo back at the output rate. Input is
//! buffered until a full chunk is available; the resampler's own latency is
//! trimmed from the front so track position stays aligned.

use rubato::{FftFixedIn, Resampler};

use crate::error::{EngineError, EngineResult};

/// Input frames per resampler call
const CHUNK_FRAMES: usize = 1024;

/// FFT sub-chunks per call (Tutti's "medium" quality)
const SUB_CHUNKS: usize = 2;

pub(crate) struct StreamResampler {
    /// `None` when both rates match
    resampler: Option<FftFixedIn<f32>>,
    /// Output frames per input frame
    ratio: f64,
    /// Deinterleaved input not yet consumed
    input: [Vec<f32>; 2],
    output: Vec<Vec<f32>>,
    /// Output frames still to drop for the resampler latency
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    pub(crate) fn new(source_rate: u32, target_rate: u32) -> EngineResult<Self> {
        let resampler = if source_rate == target_rate {
            None
        } else {
            let resampler = FftFixedIn::<f32>::new(
                source_rate as usize,
                target_rate as usize,
                CHUNK_FRAMES,
                SUB_CHUNKS,
                2,
            )
            .map_err(|e| EngineError::ResampleError(e.to_string()))?;
            Some(resampler)
        };

        let (output, delay) = match &resampler {
            Some(r) => (r.output_buffer_allocate(true), r.output_delay()),
            None => (Vec::new(), 0),
        };

        Ok(Self {
            resampler,
            ratio: target_rate as f64 / source_rate as f64,
            input: [Vec::with_capacity(CHUNK_FRAMES * 2), Vec::with_capacity(CHUNK_FRAMES * 2)],
            output,
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub(crate) fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Convert interleaved stereo `input`, appending what is ready to `out`
    pub(crate) fn process(&mut self, input: &[f32], out: &mut Vec<f32>) -> EngineResult<()> {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return Ok(());
        }

        for frame in input.chunks_exact(2) {
            self.input[0].push(frame[0]);
            self.input[1].push(frame[1]);
        }
        self.frames_in += (input.len() / 2) as u64;
        self.run(out, u64::MAX)
    }

    /// Flush the buffered tail at the end of a track
    ///
    /// Emits exactly as many frames as the input length maps to at the
    /// output rate.
    pub(crate) fn finish(&mut self, out: &mut Vec<f32>) -> EngineResult<()> {
        if self.is_passthrough() {
            return Ok(());
        }
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;

        while self.frames_out < expected {
            let needed = self.resampler.as_ref().map_or(0, |r| r.input_frames_next());
            for channel in &mut self.input {
                if channel.len() < needed {
                    channel.resize(needed, 0.0);
                }
            }
            self.run(out, expected)?;
        }
        self.input.iter_mut().for_each(Vec::clear);
        Ok(())
    }

    /// Forget buffered audio (after a seek)
    pub(crate) fn reset(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
            self.delay = resampler.output_delay();
        }
        self.input.iter_mut().for_each(Vec::clear);
        self.frames_in = 0;
        self.frames_out = 0;
    }

    /// Resample every full chunk of buffered input, emitting at most up to
    /// `limit` total output frames
    fn run(&mut self, out: &mut Vec<f32>, limit: u64) -> EngineResult<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(());
        };

        loop {
            let needed = resampler.input_frames_next();
            if self.input[0].len() < needed {
                return Ok(());
            }

            let chunk = [&self.input[0][..needed], &self.input[1][..needed]];
            let (used, produced) = resampler
                .process_into_buffer(&chunk, self.output.as_mut_slice(), None)
                .map_err(|e| EngineError::ResampleError(e.to_string()))?;
            for channel in &mut self.input {
                channel.drain(..used);
            }

            let skip = self.delay.min(produced);
            self.delay -= skip;
            for i in skip..produced {
                if self.frames_out >= limit {
                    break;
                }
                out.push(self.output[0][i]);
                out.push(self.output[1][i]);
                self.frames_out += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: f32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 2.0 * std::f32::consts::PI * 440.0 / rate).sin() * 0.5;
                [s, -s]
            })
            .collect()
    }

    #[test]
    fn test_passthrough_at_equal_rates() {
        let mut resampler = StreamResampler::new(48000, 48000).unwrap();
        assert!(resampler.is_passthrough());

        let mut out = Vec::new();
        resampler.process(&[0.1, 0.2, 0.3, 0.4], &mut out).unwrap();
        resampler.finish(&mut out).unwrap();
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_upsample_frame_count() {
        let mut resampler = StreamResampler::new(24000, 48000).unwrap();
        let input = sine(5000, 24000.0);

        let mut out = Vec::new();
        resampler.process(&input, &mut out).unwrap();
        resampler.finish(&mut out).unwrap();
        assert_eq!(out.len() / 2, 10000);
    }

    #[test]
    fn test_downsample_keeps_level() {
        let mut resampler = StreamResampler::new(96000, 48000).unwrap();
        let input = vec![0.5_f32; 48000 * 2];

        let mut out = Vec::new();
        resampler.process(&input, &mut out).unwrap();
        resampler.finish(&mut out).unwrap();

        let frames = out.len() / 2;
        assert_eq!(frames, 24000);
        // Away from the edges a constant stays constant
        for s in &out[4000 * 2..20000 * 2] {
            assert!((s - 0.5).abs() < 1e-2, "sample {}", s);
        }
    }

    #[test]
    fn test_block_size_does_not_change_output() {
        let input = sine(6000, 44100.0);

        let mut whole = StreamResampler::new(44100, 48000).unwrap();
        let mut expected = Vec::new();
        whole.process(&input, &mut expected).unwrap();
        whole.finish(&mut expected).unwrap();

        // Uneven packets, as a decoder would deliver them
        let mut split = StreamResampler::new(44100, 48000).unwrap();
        let mut out = Vec::new();
        for block in input.chunks(2 * 377) {
            split.process(block, &mut out).unwrap();
        }
        split.finish(&mut out).unwrap();

        assert_eq!(out.len(), expected.len());
        for (a, b) in out.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reset_starts_a_new_segment() {
        let mut resampler = StreamResampler::new(24000, 48000).unwrap();
        let mut out = Vec::new();
        resampler.process(&sine(3000, 24000.0), &mut out).unwrap();

        resampler.reset();
        let mut after = Vec::new();
        resampler.process(&sine(1000, 24000.0), &mut after).unwrap();
        resampler.finish(&mut after).unwrap();
        assert_eq!(after.len() / 2, 2000);
    }
}
