//! Audio Output
//!
//! The device end of the engine. An [`AudioOutput`] owns whatever drives the
//! signal graph (a cpal stream, or a manual clock in tests) and can be
//! suspended and resumed the way a browser audio context can.
//!
//! Outputs start suspended; the engine resumes them on the first play.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::StreamConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::GraphRenderer;

/// Something that pulls rendered audio from the graph
pub trait AudioOutput {
    /// Open the device (suspended) and return the sample rate it runs at
    fn open(&mut self, config: &StreamConfig) -> EngineResult<u32>;

    /// Hand the renderer over to the output; called once, after `open`
    fn connect(&mut self, renderer: GraphRenderer) -> EngineResult<()>;

    /// Start (or restart) pulling audio
    fn resume(&mut self) -> EngineResult<()>;

    /// Stop pulling audio; the graph keeps its state
    fn suspend(&mut self) -> EngineResult<()>;

    fn is_suspended(&self) -> bool;
}

struct OfflineState {
    renderer: Option<GraphRenderer>,
    sample_rate: Option<u32>,
    suspended: bool,
}

/// Output driven by hand instead of by a device
///
/// Audio only moves when [`OfflineClock::render`] is called, which makes
/// graph behaviour reproducible without hardware.
pub struct OfflineOutput {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineOutput {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(OfflineState {
                renderer: None,
                sample_rate: None,
                suspended: true,
            })),
        }
    }

    /// A handle that renders from this output; stays valid after the output
    /// has been moved into an engine
    pub fn clock(&self) -> OfflineClock {
        OfflineClock {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for OfflineOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for OfflineOutput {
    fn open(&mut self, config: &StreamConfig) -> EngineResult<u32> {
        let mut state = self.state.lock();
        state.sample_rate = Some(config.sample_rate);
        state.suspended = true;
        Ok(config.sample_rate)
    }

    fn connect(&mut self, renderer: GraphRenderer) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.sample_rate.is_none() {
            return Err(EngineError::OutputNotOpen);
        }
        state.renderer = Some(renderer);
        Ok(())
    }

    fn resume(&mut self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.sample_rate.is_none() {
            return Err(EngineError::OutputNotOpen);
        }
        state.suspended = false;
        Ok(())
    }

    fn suspend(&mut self) -> EngineResult<()> {
        self.state.lock().suspended = true;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }
}

/// Manual clock for an [`OfflineOutput`]
#[derive(Clone)]
pub struct OfflineClock {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineClock {
    /// Render `frames` interleaved stereo frames
    ///
    /// Silence while suspended or before a renderer is connected.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        let mut state = self.state.lock();
        if state.suspended {
            return out;
        }
        if let Some(renderer) = state.renderer.as_mut() {
            renderer.render(&mut out);
        }
        out
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().renderer.is_some()
    }
}
