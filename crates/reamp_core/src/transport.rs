//! Transport
//!
//! The playback primitive the player drives: it owns the current track,
//! produces its decoded audio as a [`SourceStream`] and keeps the playback
//! clock. The signal graph only ever sees the stream.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────┐  crossbeam   ┌────────────────────────────┐
//! │      Control Thread        │ ──Command──▶ │    reamp-transport         │
//! │  DecoderTransport methods  │ ◀──Event──── │  decode ▶ resample ▶ rtrb  │
//! └────────────────────────────┘              └─────────────┬──────────────┘
//!                                                           │ SourceStream
//!                                                           ▼
//!                                                  output callback (graph)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::decoder::TrackDecoder;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, TrackEvent, TransportEvent};
use crate::playlist::Track;
use crate::resample::StreamResampler;
use crate::source::{source_channel, SourceStream, SourceWriter};

/// Spacing of `TimeUpdate` events in seconds of playback
pub const TIME_UPDATE_INTERVAL: f64 = 0.25;

/// Command poll interval while idle
const IDLE_POLL: Duration = Duration::from_millis(16);

/// Back-off while the source buffer is full
const FILL_POLL: Duration = Duration::from_millis(5);

/// The external playback primitive
///
/// Implementations own decoding and clocking; the player only retargets and
/// starts/stops them.
pub trait Transport {
    /// Create the stream the graph pulls audio from
    ///
    /// Called once, when the graph is connected.
    fn open_stream(&mut self, sample_rate: u32) -> EngineResult<SourceStream>;

    /// Point the transport at a new track (paused at its start)
    ///
    /// Starts a new generation whether or not the track opens.
    fn set_track(&mut self, track: &Track) -> EngineResult<()>;

    /// Generation of the most recent `set_track`
    fn generation(&self) -> u64;

    fn play(&mut self) -> EngineResult<()>;

    fn pause(&mut self) -> EngineResult<()>;

    /// Pause and rewind to the start
    fn stop(&mut self) -> EngineResult<()> {
        self.pause()?;
        self.seek(0.0)
    }

    fn seek(&mut self, seconds: f64) -> EngineResult<()>;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    /// Track length in seconds, once known
    fn duration(&self) -> Option<f64>;

    /// Next pending event (non-blocking)
    ///
    /// May belong to an earlier generation than the current one.
    fn poll_event(&mut self) -> Option<TrackEvent>;
}

/// Playback clock shared between the worker and the control side
///
/// Rust pattern: AtomicF64 doesn't exist, so values are stored as bits.
struct TransportClock {
    position_bits: AtomicU64,
    /// NaN while unknown
    duration_bits: AtomicU64,
}

impl TransportClock {
    fn new() -> Self {
        Self {
            position_bits: AtomicU64::new(0.0_f64.to_bits()),
            duration_bits: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    fn set_position(&self, seconds: f64) {
        self.position_bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    fn set_duration(&self, duration: Option<f64>) {
        let bits = duration.unwrap_or(f64::NAN).to_bits();
        self.duration_bits.store(bits, Ordering::Relaxed);
    }

    fn duration(&self) -> Option<f64> {
        let duration = f64::from_bits(self.duration_bits.load(Ordering::Relaxed));
        (!duration.is_nan()).then_some(duration)
    }
}

/// File transport decoding with symphonia on a worker thread
pub struct DecoderTransport {
    command_sender: Sender<Command>,
    event_receiver: Receiver<TrackEvent>,
    worker: Option<JoinHandle<()>>,
    clock: Arc<TransportClock>,
    buffer_frames: usize,
    generation: u64,
    has_track: bool,
}

impl DecoderTransport {
    /// Spawn the worker; `buffer_frames` sizes the source ring
    pub fn new(buffer_frames: usize) -> EngineResult<Self> {
        let (command_sender, command_receiver) = bounded::<Command>(32);
        let (event_sender, event_receiver) = unbounded::<TrackEvent>();
        let clock = Arc::new(TransportClock::new());
        let clock_clone = Arc::clone(&clock);

        let worker = thread::Builder::new()
            .name("reamp-transport".into())
            .spawn(move || transport_thread_main(command_receiver, event_sender, clock_clone))
            .map_err(|e| EngineError::ThreadSpawnError(e.to_string()))?;

        Ok(Self {
            command_sender,
            event_receiver,
            worker: Some(worker),
            clock,
            buffer_frames,
            generation: 0,
            has_track: false,
        })
    }

    /// Events queued and not yet polled
    pub fn pending_events(&self) -> usize {
        self.event_receiver.len()
    }

    /// Send command to the worker
    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }
}

impl Transport for DecoderTransport {
    fn open_stream(&mut self, sample_rate: u32) -> EngineResult<SourceStream> {
        let (writer, stream) = source_channel(self.buffer_frames);
        self.send_command(Command::Attach { writer, sample_rate })?;
        debug!("Source stream opened at {} Hz", sample_rate);
        Ok(stream)
    }

    fn set_track(&mut self, track: &Track) -> EngineResult<()> {
        self.generation += 1;
        let decoder = match TrackDecoder::open(track.path()) {
            Ok(decoder) => decoder,
            Err(e) => {
                // The previous track must not keep playing under the new one
                let _ = self.send_command(Command::Pause);
                self.has_track = false;
                return Err(e);
            }
        };
        self.clock.set_duration(decoder.duration());
        self.clock.set_position(0.0);
        self.send_command(Command::Load {
            decoder: Box::new(decoder),
            generation: self.generation,
        })?;
        self.has_track = true;
        info!("Transport now on '{}' (generation {})", track.name(), self.generation);
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn play(&mut self) -> EngineResult<()> {
        if !self.has_track {
            return Err(EngineError::NoTrackLoaded);
        }
        self.send_command(Command::Play)
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.send_command(Command::Pause)
    }

    fn seek(&mut self, seconds: f64) -> EngineResult<()> {
        self.clock.set_position(seconds.max(0.0));
        self.send_command(Command::Seek(seconds))
    }

    fn current_time(&self) -> f64 {
        self.clock.position()
    }

    fn duration(&self) -> Option<f64> {
        self.clock.duration()
    }

    fn poll_event(&mut self) -> Option<TrackEvent> {
        self.event_receiver.try_recv().ok()
    }
}

impl Drop for DecoderTransport {
    fn drop(&mut self) {
        let _ = self.command_sender.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Transport thread panicked");
            }
        }
    }
}

struct Output {
    writer: SourceWriter,
    sample_rate: u32,
}

/// State owned by the transport thread
struct Worker {
    events: Sender<TrackEvent>,
    /// Stamped on every event; set by `Load`
    generation: u64,
    clock: Arc<TransportClock>,
    output: Option<Output>,
    track: Option<Box<TrackDecoder>>,
    resampler: Option<StreamResampler>,
    /// Decoded frames at the track rate
    decoded: Vec<f32>,
    /// Resampled frames not yet accepted by the source ring
    pending: Vec<f32>,
    playing: bool,
    /// Decoded to the end, waiting for the ring to drain
    at_end: bool,
    ended: bool,
    /// Track position the written frame count is measured from
    base_position: f64,
    written_frames: u64,
    last_update: f64,
}

impl Worker {
    fn new(events: Sender<TrackEvent>, clock: Arc<TransportClock>) -> Self {
        Self {
            events,
            generation: 0,
            clock,
            output: None,
            track: None,
            resampler: None,
            decoded: Vec::new(),
            pending: Vec::new(),
            playing: false,
            at_end: false,
            ended: false,
            base_position: 0.0,
            written_frames: 0,
            last_update: 0.0,
        }
    }

    /// Whether there is decoding or draining to do
    fn is_active(&self) -> bool {
        self.playing && self.output.is_some() && self.track.is_some()
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(TrackEvent::new(self.generation, event));
    }

    fn make_resampler(&self, source_rate: u32, target_rate: u32) -> Option<StreamResampler> {
        match StreamResampler::new(source_rate, target_rate) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                error!("No resampler for {} -> {} Hz: {}", source_rate, target_rate, e);
                self.emit(TransportEvent::error(e));
                None
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Attach { writer, sample_rate } => {
                writer.set_paused(!self.playing);
                self.resampler = self
                    .track
                    .as_ref()
                    .and_then(|t| self.make_resampler(t.sample_rate(), sample_rate));
                self.base_position = self.position();
                self.written_frames = 0;
                self.pending.clear();
                self.output = Some(Output { writer, sample_rate });
            }
            Command::Load { decoder, generation } => {
                let duration = decoder.duration();
                self.generation = generation;
                if let Some(output) = &self.output {
                    output.writer.flush();
                    output.writer.set_paused(true);
                    self.resampler = self.make_resampler(decoder.sample_rate(), output.sample_rate);
                }
                self.track = Some(decoder);
                self.pending.clear();
                self.playing = false;
                self.at_end = false;
                self.ended = false;
                self.base_position = 0.0;
                self.written_frames = 0;
                self.last_update = 0.0;
                self.clock.set_position(0.0);
                self.emit(TransportEvent::Loaded { duration });
            }
            Command::Play => {
                if self.track.is_none() {
                    self.emit(TransportEvent::error(EngineError::NoTrackLoaded));
                    return;
                }
                if self.ended {
                    // Replay from the top after the end, like a media element
                    self.seek(0.0);
                }
                self.playing = true;
                if let Some(output) = &self.output {
                    output.writer.set_paused(false);
                }
            }
            Command::Pause => {
                self.playing = false;
                if let Some(output) = &self.output {
                    output.writer.set_paused(true);
                }
                self.publish_position();
            }
            Command::Seek(seconds) => self.seek(seconds),
            Command::Shutdown => {}
        }
    }

    fn seek(&mut self, seconds: f64) {
        let Some(track) = self.track.as_mut() else {
            return;
        };
        match track.seek(seconds) {
            Ok(position) => {
                self.base_position = position;
                self.written_frames = 0;
                self.pending.clear();
                self.at_end = false;
                self.ended = false;
                if let Some(resampler) = self.resampler.as_mut() {
                    resampler.reset();
                }
                if let Some(output) = &self.output {
                    output.writer.flush();
                }
                self.clock.set_position(position);
                self.last_update = position;
                self.emit(TransportEvent::TimeUpdate { position });
            }
            Err(e) => {
                warn!("Seek to {:.2}s failed: {}", seconds, e);
                self.emit(TransportEvent::error(e));
            }
        }
    }

    /// Position of the frame the output is rendering now
    fn position(&self) -> f64 {
        match &self.output {
            Some(output) => {
                let rendered = self
                    .written_frames
                    .saturating_sub(output.writer.buffered_frames() as u64);
                self.base_position + rendered as f64 / output.sample_rate as f64
            }
            None => self.base_position,
        }
    }

    fn publish_position(&mut self) {
        let position = self.position();
        self.clock.set_position(position);
        if (position - self.last_update).abs() >= TIME_UPDATE_INTERVAL {
            self.last_update = position;
            self.emit(TransportEvent::TimeUpdate { position });
        }
    }

    /// Move one step of audio towards the output; false if there was nothing
    /// to do right now
    fn pump(&mut self) -> bool {
        let (Some(output), Some(track), Some(resampler)) =
            (self.output.as_mut(), self.track.as_mut(), self.resampler.as_mut())
        else {
            return false;
        };

        if output.writer.flush_pending() {
            return false;
        }

        if !self.pending.is_empty() {
            let written = output.writer.write(&self.pending);
            self.pending.drain(..written);
            self.written_frames += (written / 2) as u64;
            if !self.pending.is_empty() {
                return written > 0;
            }
        }

        if self.at_end {
            if output.writer.buffered_frames() == 0 && !self.ended {
                self.ended = true;
                self.playing = false;
                output.writer.set_paused(true);
                debug!("Track ended");
                let _ = self
                    .events
                    .send(TrackEvent::new(self.generation, TransportEvent::Ended));
            }
            return false;
        }

        self.decoded.clear();
        let result = match track.decode_next(&mut self.decoded) {
            Ok(true) => resampler.process(&self.decoded, &mut self.pending),
            Ok(false) => {
                self.at_end = true;
                resampler.finish(&mut self.pending)
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Decode failed: {}", e);
            let _ = self
                .events
                .send(TrackEvent::new(self.generation, TransportEvent::error(e)));
            self.at_end = true;
        }
        true
    }
}

/// Transport thread main loop
fn transport_thread_main(
    commands: Receiver<Command>,
    events: Sender<TrackEvent>,
    clock: Arc<TransportClock>,
) {
    info!("Transport thread started");
    let mut worker = Worker::new(events, clock);

    loop {
        let command = if worker.is_active() {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match commands.recv_timeout(IDLE_POLL) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        match command {
            Some(Command::Shutdown) => break,
            Some(command) => worker.handle(command),
            None if worker.is_active() => {
                if !worker.pump() {
                    thread::sleep(FILL_POLL);
                }
                worker.publish_position();
            }
            None => {}
        }
    }

    info!("Transport thread stopped");
}
