//! Audio Stream Management
//!
//! Handles the low-level CPAL stream setup and the real-time output callback.
//!
//! The stream is built when the engine initialises, before the signal graph
//! exists. The graph arrives later through a single-slot `rtrb` ring and the
//! callback adopts it on its next run; until then it writes silence.
//!
//! ```text
//! control thread ── GraphRenderer ──rtrb──▶ output callback ──▶ speakers
//! ```

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, SampleRate, Stream, SupportedBufferSize};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::GraphRenderer;
use crate::output::AudioOutput;

/// Output to the system's default device through CPAL
///
/// Not `Send`: some backends pin the stream to the thread that built it.
pub struct CpalOutput {
    /// The underlying CPAL stream (kept alive to maintain audio flow)
    stream: Option<Stream>,
    renderer_slot: Option<Producer<GraphRenderer>>,
    suspended: bool,
    sample_rate: Option<u32>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            stream: None,
            renderer_slot: None,
            suspended: true,
            sample_rate: None,
        }
    }

    /// Sample rate of the open stream
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Pick a stereo f32 configuration, preferring the requested rate
    fn pick_config(device: &Device, config: &StreamConfig) -> EngineResult<cpal::StreamConfig> {
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?
            .filter(|range| {
                range.channels() == config.channels && range.sample_format() == SampleFormat::F32
            })
            .collect();

        let wanted = config.sample_rate;
        let supported = match ranges
            .iter()
            .find(|r| r.min_sample_rate().0 <= wanted && wanted <= r.max_sample_rate().0)
        {
            Some(range) => range.clone().with_sample_rate(SampleRate(wanted)),
            None => {
                let range = ranges.into_iter().next().ok_or_else(|| {
                    EngineError::StreamBuildError("device has no stereo f32 output".into())
                })?;
                let fallback = range.with_max_sample_rate();
                warn!(
                    "{} Hz not supported by output device, using {} Hz",
                    wanted,
                    fallback.sample_rate().0
                );
                fallback
            }
        };

        let buffer_size = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&config.buffer_size) =>
            {
                BufferSize::Fixed(config.buffer_size)
            }
            _ => {
                debug!("Fixed buffer size {} unavailable, using device default", config.buffer_size);
                BufferSize::Default
            }
        };

        let mut stream_config = supported.config();
        stream_config.buffer_size = buffer_size;
        Ok(stream_config)
    }

    fn build_output_stream(
        device: &Device,
        config: &cpal::StreamConfig,
        mut renderer_slot: Consumer<GraphRenderer>,
    ) -> EngineResult<Stream> {
        let mut renderer: Option<GraphRenderer> = None;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here
                    if renderer.is_none() {
                        renderer = renderer_slot.pop().ok();
                    }

                    match renderer.as_mut() {
                        Some(renderer) => renderer.render(data),
                        None => data.fill(0.0),
                    }
                },
                move |err| {
                    error!("Output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(stream)
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, config: &StreamConfig) -> EngineResult<u32> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;
        if let Ok(name) = device.name() {
            info!("Using output device: {}", name);
        }

        let stream_config = Self::pick_config(&device, config)?;
        let (producer, consumer) = RingBuffer::<GraphRenderer>::new(1);
        let stream = Self::build_output_stream(&device, &stream_config, consumer)?;

        // Some backends start playing on build; stay suspended until resumed
        if let Err(e) = stream.pause() {
            debug!("Could not pause freshly built stream: {}", e);
        }

        let rate = stream_config.sample_rate.0;
        info!(
            "Output stream open: {} Hz, {} channels, {:?}",
            rate, stream_config.channels, stream_config.buffer_size
        );

        self.stream = Some(stream);
        self.renderer_slot = Some(producer);
        self.sample_rate = Some(rate);
        self.suspended = true;
        Ok(rate)
    }

    fn connect(&mut self, renderer: GraphRenderer) -> EngineResult<()> {
        let slot = self.renderer_slot.as_mut().ok_or(EngineError::OutputNotOpen)?;
        slot.push(renderer).map_err(|_| EngineError::ChannelSendError)
    }

    fn resume(&mut self) -> EngineResult<()> {
        let stream = self.stream.as_ref().ok_or(EngineError::OutputNotOpen)?;
        stream
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;
        self.suspended = false;
        Ok(())
    }

    fn suspend(&mut self) -> EngineResult<()> {
        let stream = self.stream.as_ref().ok_or(EngineError::OutputNotOpen)?;
        stream
            .pause()
            .map_err(|e| EngineError::StreamPauseError(e.to_string()))?;
        self.suspended = true;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }
}
