//! Signal Graph
//!
//! The fixed effects topology every track is routed through:
//!
//! ```text
//! source ─▶ preamp ─▶ EQ[0] ─▶ … ─▶ EQ[9] ─▶ split
//!
//! split ─────────────────────────────────────▶ dry gain ─┐
//! split ─▶ delay ◀─▶ feedback (loop)                     │
//!          delay ────────────────────────────▶ dry gain  ├─▶ mix
//! split ─▶ reverb ─▶ wet gain ───────────────────────────┘
//!
//! mix ─▶ panner ─▶ compressor ─▶ analyser ─▶ output
//! ```
//!
//! [`CONNECTIONS`] is the edge list; [`SignalGraph::process`] realises it on
//! interleaved stereo blocks. The graph is built once per engine and never
//! rewired.

use std::sync::Arc;

use reamp_dsp::{
    analyser, Analyser, AudioProcessor, Compressor, ConvolutionReverb, Delay, DelayParams, EqParams,
    Equalizer, Gain, ImpulseResponse, Param, ProcessorChain, StereoPanner,
};

use crate::config::EffectsConfig;
use crate::error::EngineResult;
use crate::source::SourceStream;

/// Largest block processed in one pass (interleaved samples)
const MAX_BLOCK: usize = 4096;

/// A node of the signal graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Source,
    Preamp,
    Eq(usize),
    Split,
    DryGain,
    Delay,
    DelayFeedback,
    Reverb,
    ReverbWet,
    Mix,
    Panner,
    Compressor,
    Analyser,
    Output,
}

use NodeId::*;

/// Every edge of the graph, in wiring order
///
/// Describes the topology [`SignalGraph::process`] hard-wires; nothing reads
/// it while rendering. The engine logs it when it connects the graph.
pub const CONNECTIONS: &[(NodeId, NodeId)] = &[
    (Source, Preamp),
    (Preamp, Eq(0)),
    (Eq(0), Eq(1)),
    (Eq(1), Eq(2)),
    (Eq(2), Eq(3)),
    (Eq(3), Eq(4)),
    (Eq(4), Eq(5)),
    (Eq(5), Eq(6)),
    (Eq(6), Eq(7)),
    (Eq(7), Eq(8)),
    (Eq(8), Eq(9)),
    (Eq(9), Split),
    // Parallel effects
    (Split, DryGain),
    (Split, Delay),
    (Delay, DelayFeedback),
    (DelayFeedback, Delay),
    (Delay, DryGain),
    (Split, Reverb),
    (Reverb, ReverbWet),
    // Merge
    (DryGain, Mix),
    (ReverbWet, Mix),
    (Mix, Panner),
    (Panner, Compressor),
    (Compressor, Analyser),
    (Analyser, Output),
];

/// Control-side handles to every adjustable stage parameter
#[derive(Clone)]
pub struct GraphParams {
    pub preamp: Arc<Param>,
    pub eq: Arc<EqParams>,
    pub delay: Arc<DelayParams>,
    pub dry: Arc<Param>,
    pub wet: Arc<Param>,
    pub pan: Arc<Param>,
    /// Current compressor gain reduction in dB (read-only)
    pub reduction: Arc<Param>,
}

/// Render-side stages, wired per [`CONNECTIONS`]
pub struct SignalGraph {
    /// Preamp followed by the EQ cascade
    front: ProcessorChain,
    delay: Delay,
    reverb: ConvolutionReverb,
    dry: Gain,
    wet: Gain,
    /// Panner, compressor and analyser tap
    back: ProcessorChain,
    delay_buf: Vec<f32>,
    reverb_buf: Vec<f32>,
}

impl SignalGraph {
    /// Create every stage with its default parameters
    ///
    /// The impulse response is moved into the reverb and never touched again.
    pub fn build(
        sample_rate: u32,
        effects: &EffectsConfig,
        impulse: ImpulseResponse,
    ) -> EngineResult<(Self, GraphParams, Analyser)> {
        let rate = sample_rate as f32;

        let preamp = Gain::new("Preamp", 1.0);
        let eq = Equalizer::new(rate)?;
        let delay = Delay::new(rate, effects.max_delay_seconds)?;
        let reverb = ConvolutionReverb::new(impulse, true)?;
        let dry = Gain::new("Dry", 1.0);
        let wet = Gain::new("Reverb Wet", 0.0);
        let panner = StereoPanner::new();
        let compressor = Compressor::new(rate);
        let (tap, analyser) = analyser();

        let params = GraphParams {
            preamp: preamp.param(),
            eq: eq.params(),
            delay: delay.params(),
            dry: dry.param(),
            wet: wet.param(),
            pan: panner.param(),
            reduction: compressor.reduction(),
        };

        let front = ProcessorChain::new(rate, 2, MAX_BLOCK / 2)
            .with(preamp)
            .with(eq);
        let back = ProcessorChain::new(rate, 2, MAX_BLOCK / 2)
            .with(panner)
            .with(compressor)
            .with(tap);

        let graph = Self {
            front,
            delay,
            reverb,
            dry,
            wet,
            back,
            delay_buf: vec![0.0; MAX_BLOCK],
            reverb_buf: vec![0.0; MAX_BLOCK],
        };

        Ok((graph, params, analyser))
    }

    /// Stage names in processing order
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.front.names().collect();
        names.extend([
            AudioProcessor::name(&self.delay),
            AudioProcessor::name(&self.reverb),
            self.dry.name(),
            self.wet.name(),
        ]);
        names.extend(self.back.names());
        names
    }

    /// Samples of latency on the reverb path
    pub fn reverb_latency(&self) -> usize {
        self.reverb.latency()
    }

    /// Reverb kernel length per channel
    pub fn impulse_len(&self) -> usize {
        self.reverb.kernel_len()
    }

    /// Run a block of interleaved stereo source audio through the graph,
    /// in place
    ///
    /// # Real-time Safety
    /// No allocations: large buffers are processed in `MAX_BLOCK` pieces.
    pub fn process(&mut self, buffer: &mut [f32]) {
        for block in buffer.chunks_mut(MAX_BLOCK) {
            self.process_block(block);
        }
    }

    fn process_block(&mut self, block: &mut [f32]) {
        let len = block.len();
        let context = *self.front.context();

        self.front.process(block);

        // Split into the three parallel paths
        let delayed = &mut self.delay_buf[..len];
        delayed.copy_from_slice(block);
        self.delay.process_interleaved(delayed);

        let reverbed = &mut self.reverb_buf[..len];
        reverbed.copy_from_slice(block);
        self.reverb.process_interleaved(reverbed);

        // Dry gain takes the split and the delay output
        for (sample, delayed) in block.iter_mut().zip(self.delay_buf[..len].iter()) {
            *sample += delayed;
        }
        self.dry.process(block, &context);

        self.wet.process(&mut self.reverb_buf[..len], &context);
        for (sample, wet) in block.iter_mut().zip(self.reverb_buf[..len].iter()) {
            *sample += wet;
        }

        self.back.process(block);
    }

    /// Clear every delay line, filter state and envelope
    pub fn reset(&mut self) {
        self.front.reset();
        self.delay.reset();
        self.reverb.reset();
        self.back.reset();
    }
}

/// The graph bound to its source; what the output device drives
pub struct GraphRenderer {
    source: SourceStream,
    graph: SignalGraph,
}

impl GraphRenderer {
    pub fn new(source: SourceStream, graph: SignalGraph) -> Self {
        Self { source, graph }
    }

    /// Pull `out.len() / 2` frames from the source and process them
    #[inline]
    pub fn render(&mut self, out: &mut [f32]) {
        self.source.read(out);
        self.graph.process(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reamp_dsp::EQ_BANDS;

    fn test_graph() -> (SignalGraph, GraphParams, Analyser) {
        let ir = ImpulseResponse::from_channels(48000.0, vec![0.5; 64], vec![0.5; 64]).unwrap();
        SignalGraph::build(48000, &EffectsConfig::default(), ir).unwrap()
    }

    fn sine(frames: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 0.05).sin() * 0.1;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_every_eq_band_is_in_the_chain() {
        for (band, freq) in EQ_BANDS.iter().enumerate() {
            let tone: Vec<f32> = (0..4096)
                .flat_map(|i| {
                    let s = (i as f32 * 2.0 * std::f32::consts::PI * freq / 48000.0).sin() * 0.1;
                    [s, s]
                })
                .collect();

            let (mut flat, _, _) = test_graph();
            let (mut cut, params, _) = test_graph();
            params.eq.set_gain(band, -40.0).unwrap();

            let mut a = tone.clone();
            let mut b = tone;
            flat.process(&mut a);
            cut.process(&mut b);

            let diff = a.iter().zip(&b).fold(0.0_f32, |m, (x, y)| m.max((x - y).abs()));
            assert!(diff > 1e-3, "band {} ({} Hz) had no effect", band, freq);
        }
    }

    #[test]
    fn test_delay_feedback_repeats_echo() {
        let impulse = || {
            let mut buffer = vec![0.0; 4096];
            buffer[0] = 0.1;
            buffer[1] = 0.1;
            buffer
        };

        let (mut single, params, _) = test_graph();
        params.delay.time.set(0.01);
        let mut once = impulse();
        single.process(&mut once);

        let (mut looped, params, _) = test_graph();
        params.delay.time.set(0.01);
        params.delay.feedback.set(0.5);
        let mut repeated = impulse();
        looped.process(&mut repeated);

        // Without feedback there is one echo; with it the echo comes back
        assert!(once[480 * 2].abs() > 1e-3);
        assert!(once[960 * 2].abs() < 1e-6);
        assert!(repeated[960 * 2].abs() > 1e-4);
        assert!(repeated[960 * 2].abs() < repeated[480 * 2].abs());
    }

    #[test]
    fn test_reverb_bypasses_dry_gain() {
        let (mut graph, params, _) = test_graph();
        params.dry.set(0.0);
        params.wet.set(1.0);
        params.delay.time.set(0.01);

        let mut buffer = vec![0.0; 4096];
        buffer[0] = 0.1;
        buffer[1] = 0.1;
        graph.process(&mut buffer);

        // The echo at 480 frames is muted with the dry path; the reverb,
        // arriving after its latency, is not
        let latency = graph.reverb_latency();
        assert!(latency > 480);
        assert!(buffer[480 * 2].abs() < 1e-6);
        assert!(buffer[..latency * 2].iter().all(|s| s.abs() < 1e-6));
        assert!(buffer.iter().any(|s| s.abs() > 1e-4));
    }

    #[test]
    fn test_stage_order() {
        let (graph, _, _) = test_graph();
        assert_eq!(
            graph.stage_names(),
            vec![
                "Preamp",
                "10-Band Equalizer",
                "Delay",
                "Convolution Reverb",
                "Dry",
                "Reverb Wet",
                "Stereo Panner",
                "Dynamics Compressor",
                "Analyser",
            ]
        );
    }

    #[test]
    fn test_silence_in_silence_out() {
        let (mut graph, _, _) = test_graph();
        let mut buffer = vec![0.0; 1024];
        graph.process(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_dry_gain_scales_output() {
        let (mut loud, _, _) = test_graph();
        let (mut quiet, params, _) = test_graph();
        params.dry.set(0.0);

        let mut a = sine(512);
        let mut b = a.clone();
        loud.process(&mut a);
        quiet.process(&mut b);

        assert!(a.iter().any(|s| s.abs() > 1e-3));
        // Wet defaults to 0, so nothing is left
        assert!(b.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_wet_path_adds_reverb_after_latency() {
        let (mut graph, params, _) = test_graph();
        params.dry.set(0.0);
        params.wet.set(1.0);

        let mut buffer = vec![0.0; 4096];
        buffer[0] = 0.5;
        buffer[1] = 0.5;
        graph.process(&mut buffer);

        let latency = graph.reverb_latency() * 2;
        assert!(buffer[..latency].iter().all(|s| s.abs() < 1e-6));
        assert!(buffer[latency..].iter().any(|s| s.abs() > 1e-6));
    }

    #[test]
    fn test_delay_output_feeds_dry_path() {
        let (mut graph, params, _) = test_graph();
        params.delay.time.set(0.01); // 480 samples

        let mut buffer = vec![0.0; 2048];
        buffer[0] = 0.1;
        buffer[1] = 0.1;
        graph.process(&mut buffer);

        // Direct impulse plus its echo 480 frames later
        assert!(buffer[0].abs() > 1e-3);
        assert!(buffer[480 * 2].abs() > 1e-3);
        assert!(buffer[240 * 2].abs() < 1e-6);
    }

    #[test]
    fn test_large_buffers_are_chunked() {
        let (mut graph, _, _) = test_graph();
        let mut buffer = sine(MAX_BLOCK * 3);
        graph.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_renderer_reads_source() {
        let (graph, _, analyser) = test_graph();
        let (mut writer, stream) = crate::source::source_channel(1024);
        writer.write(&sine(256));

        let mut renderer = GraphRenderer::new(stream, graph);
        let mut out = vec![0.0; 512];
        renderer.render(&mut out);

        assert!(out.iter().any(|s| s.abs() > 1e-3));
        assert!(analyser.update());
    }
}
