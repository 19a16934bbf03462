//! Engine and Stream Configuration

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Number of audio channels (the graph is stereo only)
    pub channels: u16,

    /// Buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 512,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.channels != 2 {
            return Err(format!("Invalid channel count: {} (stereo only)", self.channels));
        }
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Sizes of the effect stages, fixed at engine init
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectsConfig {
    /// Length of the synthetic reverb impulse (seconds)
    pub reverb_seconds: f32,

    /// Decay exponent of the reverb impulse envelope
    pub reverb_decay: f32,

    /// Capacity of the delay line (seconds)
    pub max_delay_seconds: f32,

    /// Frames of decoded audio buffered between transport and graph
    pub source_buffer_frames: usize,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            reverb_seconds: reamp_dsp::DEFAULT_DURATION_SECS,
            reverb_decay: reamp_dsp::DEFAULT_DECAY,
            max_delay_seconds: reamp_dsp::MAX_DELAY_SECONDS,
            source_buffer_frames: 8192,
        }
    }
}

impl EffectsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.reverb_seconds > 0.0) || self.reverb_seconds > 10.0 {
            return Err(format!("Invalid reverb length: {}", self.reverb_seconds));
        }
        if !self.reverb_decay.is_finite() || self.reverb_decay < 0.0 {
            return Err(format!("Invalid reverb decay: {}", self.reverb_decay));
        }
        if !(self.max_delay_seconds > 0.0) || self.max_delay_seconds > 60.0 {
            return Err(format!("Invalid max delay: {}", self.max_delay_seconds));
        }
        if self.source_buffer_frames < 256 {
            return Err(format!(
                "Invalid source buffer: {} frames",
                self.source_buffer_frames
            ));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Output stream configuration
    pub stream: StreamConfig,

    /// Effect stage sizing
    #[serde(default)]
    pub effects: EffectsConfig,
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 128, // ~2.6ms latency
            },
            effects: EffectsConfig {
                source_buffer_frames: 4096,
                ..Default::default()
            },
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 1024, // ~21ms latency
            },
            effects: EffectsConfig {
                source_buffer_frames: 16384,
                ..Default::default()
            },
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.stream.validate().map_err(EngineError::ConfigError)?;
        self.effects.validate().map_err(EngineError::ConfigError)
    }
}
