//! Audio Engine - Parameter Control Surface
//!
//! The AudioEngine owns the output device and the signal graph, and is the
//! only way the rest of the program touches either.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──init()──▶ Unconnected ──connect(stream)──▶ Connected
//! ```
//!
//! `init` opens the output (suspended), generates the reverb impulse and
//! builds every stage. `connect` binds the graph to a source stream and hands
//! it to the output; it happens once per engine, later tracks only retarget
//! the transport.
//!
//! Every setter is a wait-free atomic store and a silent no-op before `init`.

use reamp_dsp::{find_preset, Analyser, ImpulseResponse, NUM_BANDS};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{GraphParams, GraphRenderer, SignalGraph, CONNECTIONS};
use crate::output::AudioOutput;
use crate::source::SourceStream;

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    /// Graph built, no source attached yet
    Unconnected,
    Connected,
}

/// Everything that exists once the engine is initialized
struct Nodes {
    params: GraphParams,
    analyser: Analyser,
    /// Taken when the graph is handed to the output
    graph: Option<SignalGraph>,
    sample_rate: u32,
    impulse_len: usize,
}

/// Main audio engine handle
pub struct AudioEngine<O: AudioOutput> {
    config: EngineConfig,
    output: O,
    nodes: Option<Nodes>,
    state: EngineState,
}

impl<O: AudioOutput> AudioEngine<O> {
    /// Create an engine; nothing is opened until [`AudioEngine::init`]
    pub fn new(config: EngineConfig, output: O) -> Self {
        Self {
            config,
            output,
            nodes: None,
            state: EngineState::Uninitialized,
        }
    }

    /// Open the output and build the graph
    ///
    /// Idempotent: after the first success this returns immediately.
    pub fn init(&mut self) -> EngineResult<()> {
        if self.state != EngineState::Uninitialized {
            return Ok(());
        }

        self.config.validate()?;
        let sample_rate = self.output.open(&self.config.stream)?;

        let effects = &self.config.effects;
        let impulse =
            ImpulseResponse::generate(sample_rate as f32, effects.reverb_seconds, effects.reverb_decay)?;
        let impulse_len = impulse.len();

        let (graph, params, analyser) = SignalGraph::build(sample_rate, effects, impulse)?;
        info!(
            "Audio engine initialized: {} Hz, {} impulse frames, {} stages",
            sample_rate,
            impulse_len,
            graph.stage_names().len()
        );

        self.nodes = Some(Nodes {
            params,
            analyser,
            graph: Some(graph),
            sample_rate,
            impulse_len,
        });
        self.state = EngineState::Unconnected;
        Ok(())
    }

    /// Wire the graph to its source and start rendering it on the output
    ///
    /// Only the first call connects anything; later calls drop the stream.
    pub fn connect(&mut self, source: SourceStream) -> EngineResult<()> {
        match self.state {
            EngineState::Uninitialized => return Err(EngineError::NotInitialized),
            EngineState::Connected => {
                warn!("Graph already connected, ignoring new source");
                return Ok(());
            }
            EngineState::Unconnected => {}
        }

        let graph = self
            .nodes
            .as_mut()
            .and_then(|nodes| nodes.graph.take())
            .ok_or(EngineError::NotInitialized)?;

        for (from, to) in CONNECTIONS {
            debug!("connect {:?} -> {:?}", from, to);
        }

        self.output.connect(GraphRenderer::new(source, graph))?;
        self.state = EngineState::Connected;
        info!("Signal graph connected ({} edges)", CONNECTIONS.len());
        Ok(())
    }

    /// Resume the output clock
    pub fn resume(&mut self) -> EngineResult<()> {
        if self.state == EngineState::Uninitialized {
            return Err(EngineError::NotInitialized);
        }
        if self.output.is_suspended() {
            self.output.resume()?;
            debug!("Output resumed");
        }
        Ok(())
    }

    /// Suspend the output clock
    pub fn suspend(&mut self) -> EngineResult<()> {
        if self.state == EngineState::Uninitialized || self.output.is_suspended() {
            return Ok(());
        }
        self.output.suspend()
    }

    pub fn is_suspended(&self) -> bool {
        self.output.is_suspended()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != EngineState::Uninitialized
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sample rate the output runs at
    pub fn sample_rate(&self) -> Option<u32> {
        self.nodes.as_ref().map(|n| n.sample_rate)
    }

    /// Frames per channel of the generated impulse response
    pub fn impulse_len(&self) -> Option<usize> {
        self.nodes.as_ref().map(|n| n.impulse_len)
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    fn params(&self) -> Option<&GraphParams> {
        self.nodes.as_ref().map(|n| &n.params)
    }

    // =========================================================================
    // Parameter setters
    // =========================================================================

    /// Preamp gain (linear, unclamped)
    pub fn set_volume(&self, volume: f32) {
        if let Some(params) = self.params() {
            params.preamp.set(volume);
        }
    }

    /// Stereo position; the panner clamps to [-1, 1] when rendering
    pub fn set_pan(&self, pan: f32) {
        if let Some(params) = self.params() {
            params.pan.set(pan);
        }
    }

    /// Gain of one EQ band in dB; indices outside 0..10 are ignored
    pub fn set_eq_band(&self, band: usize, gain_db: f32) {
        if let Some(params) = self.params() {
            if params.eq.set_gain(band, gain_db).is_err() {
                debug!("Ignoring gain for EQ band {}", band);
            }
        }
    }

    pub fn set_delay_time(&self, seconds: f32) {
        if let Some(params) = self.params() {
            params.delay.time.set(seconds);
        }
    }

    /// Feedback gain of the delay loop, used as given
    pub fn set_delay_feedback(&self, feedback: f32) {
        if let Some(params) = self.params() {
            params.delay.feedback.set(feedback);
        }
    }

    /// Reverb amount: wet = `mix`, dry = `1 - mix / 2`
    pub fn set_reverb_mix(&self, mix: f32) {
        if let Some(params) = self.params() {
            params.wet.set(mix);
            params.dry.set(1.0 - mix * 0.5);
        }
    }

    // =========================================================================
    // Read-back
    // =========================================================================

    pub fn volume(&self) -> Option<f32> {
        self.params().map(|p| p.preamp.get())
    }

    pub fn pan(&self) -> Option<f32> {
        self.params().map(|p| p.pan.get())
    }

    pub fn delay_time(&self) -> Option<f32> {
        self.params().map(|p| p.delay.time.get())
    }

    pub fn delay_feedback(&self) -> Option<f32> {
        self.params().map(|p| p.delay.feedback.get())
    }

    pub fn reverb_wet(&self) -> Option<f32> {
        self.params().map(|p| p.wet.get())
    }

    pub fn dry_gain(&self) -> Option<f32> {
        self.params().map(|p| p.dry.get())
    }

    /// Current compressor gain reduction in dB (zero or negative)
    pub fn compressor_reduction(&self) -> Option<f32> {
        self.params().map(|p| p.reduction.get())
    }

    // =========================================================================
    // EQ state
    // =========================================================================

    /// Gains of all ten bands; empty before init
    pub fn eq_state(&self) -> Vec<f32> {
        self.params()
            .map(|p| p.eq.gains().to_vec())
            .unwrap_or_default()
    }

    /// Apply gains band by band; extra entries are dropped and missing bands
    /// keep their gain
    pub fn set_eq_state(&self, gains: &[f32]) {
        for (band, &gain_db) in gains.iter().take(NUM_BANDS).enumerate() {
            self.set_eq_band(band, gain_db);
        }
    }

    /// Apply a built-in EQ preset by name; false if there is no such preset
    pub fn apply_preset(&self, name: &str) -> bool {
        match find_preset(name) {
            Some(gains) => {
                self.set_eq_state(gains);
                true
            }
            None => {
                warn!("Unknown EQ preset: {}", name);
                false
            }
        }
    }

    // =========================================================================
    // Analyser
    // =========================================================================

    /// Latest byte spectrum, or all zeros before init
    ///
    /// Fills the first `min(out.len(), 1024)` entries.
    pub fn analyser_data(&self, out: &mut [u8]) {
        match &self.nodes {
            Some(nodes) => nodes.analyser.byte_frequency_data(out),
            None => out.fill(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectsConfig;
    use crate::output::OfflineOutput;
    use crate::source::source_channel;
    use reamp_dsp::FREQUENCY_BIN_COUNT;

    fn test_config() -> EngineConfig {
        EngineConfig {
            effects: EffectsConfig {
                reverb_seconds: 0.1,
                ..EffectsConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn ready_engine() -> AudioEngine<OfflineOutput> {
        let mut engine = AudioEngine::new(test_config(), OfflineOutput::new());
        engine.init().unwrap();
        engine
    }

    #[test]
    fn test_engine_creation() {
        let engine = AudioEngine::new(EngineConfig::default(), OfflineOutput::new());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(!engine.is_initialized());
        assert_eq!(engine.sample_rate(), None);
    }

    #[test]
    fn test_setters_before_init_are_ignored() {
        let engine = AudioEngine::new(EngineConfig::default(), OfflineOutput::new());
        engine.set_volume(0.5);
        engine.set_pan(-1.0);
        engine.set_eq_band(0, 6.0);
        engine.set_delay_time(0.3);
        engine.set_delay_feedback(0.4);
        engine.set_reverb_mix(0.5);

        assert!(engine.eq_state().is_empty());
        assert_eq!(engine.volume(), None);
        assert_eq!(engine.reverb_wet(), None);
        assert_eq!(engine.compressor_reduction(), None);

        let mut data = [7u8; 16];
        engine.analyser_data(&mut data);
        assert_eq!(data, [0u8; 16]);
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut engine = ready_engine();
        engine.set_volume(0.25);
        engine.init().unwrap();
        assert_eq!(engine.state(), EngineState::Unconnected);
        assert_eq!(engine.volume(), Some(0.25));
        assert!(engine.is_suspended());
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let mut config = EngineConfig::default();
        config.stream.channels = 6;
        let mut engine = AudioEngine::new(config, OfflineOutput::new());
        assert!(matches!(engine.init(), Err(EngineError::ConfigError(_))));
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_default_parameters() {
        let engine = ready_engine();
        assert_eq!(engine.volume(), Some(1.0));
        assert_eq!(engine.pan(), Some(0.0));
        assert_eq!(engine.delay_time(), Some(0.0));
        assert_eq!(engine.delay_feedback(), Some(0.0));
        assert_eq!(engine.reverb_wet(), Some(0.0));
        assert_eq!(engine.dry_gain(), Some(1.0));
        assert_eq!(engine.eq_state(), vec![0.0; NUM_BANDS]);
    }

    #[test]
    fn test_impulse_length_matches_config() {
        let engine = ready_engine();
        assert_eq!(engine.sample_rate(), Some(48000));
        assert_eq!(engine.impulse_len(), Some(4800));
    }

    #[test]
    fn test_volume_is_not_clamped() {
        let engine = ready_engine();
        engine.set_volume(1.5);
        assert_eq!(engine.volume(), Some(1.5));
    }

    #[test]
    fn test_pan_and_delay_are_stored_as_given() {
        let engine = ready_engine();
        engine.set_pan(2.0);
        engine.set_delay_time(7.0);
        engine.set_delay_feedback(1.2);

        assert_eq!(engine.pan(), Some(2.0));
        assert_eq!(engine.delay_time(), Some(7.0));
        assert_eq!(engine.delay_feedback(), Some(1.2));

        engine.set_pan(-3.5);
        engine.set_delay_feedback(-0.5);
        assert_eq!(engine.pan(), Some(-3.5));
        assert_eq!(engine.delay_feedback(), Some(-0.5));
    }

    #[test]
    fn test_reverb_mix_coupling() {
        let engine = ready_engine();
        engine.set_reverb_mix(0.4);
        assert_eq!(engine.reverb_wet(), Some(0.4));
        assert!((engine.dry_gain().unwrap() - 0.8).abs() < 1e-6);

        engine.set_reverb_mix(1.0);
        assert_eq!(engine.dry_gain(), Some(0.5));
    }

    #[test]
    fn test_eq_band_last_write_wins() {
        let engine = ready_engine();
        engine.set_eq_band(3, 6.0);
        engine.set_eq_band(3, -6.0);
        assert_eq!(engine.eq_state()[3], -6.0);
    }

    #[test]
    fn test_eq_band_out_of_range_ignored() {
        let engine = ready_engine();
        engine.set_eq_band(10, 6.0);
        assert_eq!(engine.eq_state(), vec![0.0; NUM_BANDS]);
    }

    #[test]
    fn test_set_eq_state_partial_and_extra() {
        let engine = ready_engine();
        engine.set_eq_state(&[1.0; NUM_BANDS]);
        engine.set_eq_state(&[2.0, 3.0]);
        let state = engine.eq_state();
        assert_eq!(&state[..3], &[2.0, 3.0, 1.0]);

        engine.set_eq_state(&[4.0; 12]);
        assert_eq!(engine.eq_state(), vec![4.0; NUM_BANDS]);
    }

    #[test]
    fn test_eq_state_round_trip_is_idempotent() {
        let engine = ready_engine();
        engine.set_eq_state(&[1.0, -2.0, 3.0, 0.0, 0.5, 0.0, -1.5, 2.0, 0.0, 6.0]);
        let first = engine.eq_state();
        engine.set_eq_state(&first);
        assert_eq!(engine.eq_state(), first);
    }

    #[test]
    fn test_apply_preset() {
        let engine = ready_engine();
        assert!(engine.apply_preset("rock"));
        assert_eq!(
            engine.eq_state(),
            vec![4.0, 3.0, 2.0, 0.0, -1.0, -1.0, 0.0, 2.0, 3.0, 4.0]
        );
        assert!(!engine.apply_preset("Polka"));
    }

    #[test]
    fn test_connect_requires_init() {
        let mut engine = AudioEngine::new(EngineConfig::default(), OfflineOutput::new());
        let (_writer, stream) = source_channel(64);
        assert!(matches!(
            engine.connect(stream),
            Err(EngineError::NotInitialized)
        ));
        assert!(matches!(engine.resume(), Err(EngineError::NotInitialized)));
    }

    #[test]
    fn test_connect_once() {
        let mut engine = ready_engine();
        let clock = engine.output().clock();

        let (_first_writer, first) = source_channel(64);
        engine.connect(first).unwrap();
        assert_eq!(engine.state(), EngineState::Connected);
        assert!(clock.is_connected());

        let (_second_writer, second) = source_channel(64);
        engine.connect(second).unwrap();
        assert_eq!(engine.state(), EngineState::Connected);
    }

    #[test]
    fn test_resume_and_suspend() {
        let mut engine = ready_engine();
        assert!(engine.is_suspended());
        engine.resume().unwrap();
        assert!(!engine.is_suspended());
        engine.suspend().unwrap();
        assert!(engine.is_suspended());
    }

    #[test]
    fn test_parameters_reach_the_render_path() {
        let mut engine = ready_engine();
        let clock = engine.output().clock();
        let (mut writer, stream) = source_channel(8192);
        engine.connect(stream).unwrap();
        engine.resume().unwrap();

        let tone: Vec<f32> = (0..2048)
            .flat_map(|i| {
                let s = (i as f32 * 0.05).sin() * 0.2;
                [s, s]
            })
            .collect();

        writer.write(&tone);
        let loud = clock.render(2048);

        engine.set_volume(0.0);
        writer.write(&tone);
        let muted = clock.render(2048);

        assert!(loud.iter().any(|s| s.abs() > 1e-3));
        // The delay line still holds one sample of the previous block
        assert!(muted[4..].iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_analyser_data_after_render() {
        let mut engine = ready_engine();
        let clock = engine.output().clock();
        let (mut writer, stream) = source_channel(8192);
        engine.connect(stream).unwrap();
        engine.resume().unwrap();

        let tone: Vec<f32> = (0..4096)
            .flat_map(|i| {
                let s = (i as f32 * 0.2).sin() * 0.5;
                [s, s]
            })
            .collect();
        writer.write(&tone);
        clock.render(4096);

        let mut data = vec![0u8; FREQUENCY_BIN_COUNT + 8];
        engine.analyser_data(&mut data);
        assert!(data[..FREQUENCY_BIN_COUNT].iter().any(|&b| b > 0));
        assert_eq!(&data[FREQUENCY_BIN_COUNT..], &[0u8; 8]);
    }
}
