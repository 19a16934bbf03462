//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use reamp_core::{
    source_channel, AudioEngine, EffectsConfig, EngineConfig, EngineResult, OfflineClock,
    OfflineOutput, Player, SourceStream, SourceWriter, Track, TrackEvent, Transport,
    TransportEvent,
};
use tempfile::TempDir;

/// What the scripted transport saw, shared with the test body
#[derive(Default)]
pub struct Script {
    pub writer: Option<SourceWriter>,
    pub loaded: Vec<String>,
    pub generation: u64,
    pub events: VecDeque<TrackEvent>,
    pub streams_opened: usize,
}

/// Transport whose audio and events are supplied by the test
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    pub script: Rc<RefCell<Script>>,
}

impl ScriptedTransport {
    /// Queue interleaved stereo samples on the source stream
    pub fn feed(&self, samples: &[f32]) -> usize {
        self.script
            .borrow_mut()
            .writer
            .as_mut()
            .map_or(0, |writer| writer.write(samples))
    }

    /// Queue an event for the current track
    pub fn push_event(&self, event: TransportEvent) {
        let mut script = self.script.borrow_mut();
        let generation = script.generation;
        script.events.push_back(TrackEvent::new(generation, event));
    }
}

impl Transport for ScriptedTransport {
    fn open_stream(&mut self, _sample_rate: u32) -> EngineResult<SourceStream> {
        let (writer, stream) = source_channel(16384);
        let mut script = self.script.borrow_mut();
        script.writer = Some(writer);
        script.streams_opened += 1;
        Ok(stream)
    }

    fn set_track(&mut self, track: &Track) -> EngineResult<()> {
        let mut script = self.script.borrow_mut();
        script.loaded.push(track.name().to_string());
        script.generation += 1;
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.script.borrow().generation
    }

    fn play(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn seek(&mut self, _seconds: f64) -> EngineResult<()> {
        Ok(())
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn poll_event(&mut self) -> Option<TrackEvent> {
        self.script.borrow_mut().events.pop_front()
    }
}

/// Config with a short reverb so tests build quickly
pub fn quick_config() -> EngineConfig {
    EngineConfig {
        effects: EffectsConfig {
            reverb_seconds: 0.1,
            ..EffectsConfig::default()
        },
        ..EngineConfig::default()
    }
}

/// Player over a scripted transport and an offline output
pub fn scripted_player() -> (Player<ScriptedTransport, OfflineOutput>, ScriptedTransport, OfflineClock) {
    let output = OfflineOutput::new();
    let clock = output.clock();
    let transport = ScriptedTransport::default();
    let player = Player::new(AudioEngine::new(quick_config(), output), transport.clone());
    (player, transport, clock)
}

/// Interleaved stereo sine
pub fn tone(frames: usize, amplitude: f32) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let s = (i as f32 * 2.0 * std::f32::consts::PI * 440.0 / 48000.0).sin() * amplitude;
            [s, s]
        })
        .collect()
}

pub fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Write a 16-bit PCM WAV file into `dir`
pub fn write_wav(dir: &TempDir, name: &str, sample_rate: u32, channels: u16, samples: &[i16]) -> PathBuf {
    let path = dir.path().join(format!("{name}.wav"));
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
    path
}
