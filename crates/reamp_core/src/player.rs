//! Player - Transport Adapter
//!
//! Ties the playlist, the transport and the engine together. All calls are
//! made from one control thread; transport notifications are drained by
//! [`Player::poll_events`], which runs the registered callbacks.
//!
//! Failures on this surface are logged, never returned: a track that will
//! not start leaves the player usable.

use tracing::{debug, error, info, warn};

use crate::engine::{AudioEngine, EngineState};
use crate::error::EngineResult;
use crate::message::{PlaybackState, TrackEvent, TransportEvent};
use crate::output::AudioOutput;
use crate::playlist::{Playlist, Track};
use crate::transport::Transport;

type TimeUpdateCallback = Box<dyn FnMut(f64)>;
type EndedCallback = Box<dyn FnMut()>;
type TrackChangeCallback = Box<dyn FnMut(usize, &Track)>;

pub struct Player<T: Transport, O: AudioOutput> {
    engine: AudioEngine<O>,
    transport: T,
    playlist: Playlist,
    state: PlaybackState,
    on_time_update: Option<TimeUpdateCallback>,
    on_ended: Option<EndedCallback>,
    on_track_change: Option<TrackChangeCallback>,
}

impl<T: Transport, O: AudioOutput> Player<T, O> {
    pub fn new(engine: AudioEngine<O>, transport: T) -> Self {
        Self {
            engine,
            transport,
            playlist: Playlist::new(),
            state: PlaybackState::NoTrack,
            on_time_update: None,
            on_ended: None,
            on_track_change: None,
        }
    }

    pub fn engine(&self) -> &AudioEngine<O> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine<O> {
        &mut self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Initialize the engine ahead of the first track
    pub fn init(&mut self) -> EngineResult<()> {
        self.engine.init()
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Called with the position in seconds as playback advances
    pub fn on_time_update(&mut self, callback: impl FnMut(f64) + 'static) {
        self.on_time_update = Some(Box::new(callback));
    }

    /// Called when a track plays to its end, before advancing
    pub fn on_ended(&mut self, callback: impl FnMut() + 'static) {
        self.on_ended = Some(Box::new(callback));
    }

    /// Called with the index and track whenever a new track is loaded
    pub fn on_track_change(&mut self, callback: impl FnMut(usize, &Track) + 'static) {
        self.on_track_change = Some(Box::new(callback));
    }

    // =========================================================================
    // Playlist
    // =========================================================================

    /// Append tracks; loads the first one if nothing was selected yet
    pub fn add_to_playlist<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<std::path::PathBuf>,
    {
        let added = self
            .playlist
            .extend(paths.into_iter().map(Track::from_path));
        debug!("Added {} tracks to the playlist", added);

        if added > 0 && self.playlist.current_index().is_none() {
            self.load_track(0);
        }
    }

    /// Make track `index` current and start playing it
    ///
    /// Out-of-range indices are ignored.
    pub fn load_track(&mut self, index: usize) {
        if index >= self.playlist.len() {
            debug!("Ignoring load of track {} (playlist has {})", index, self.playlist.len());
            return;
        }

        if let Err(e) = self.engine.init() {
            error!("Failed to initialize audio engine: {}", e);
            return;
        }

        self.playlist.select(index);
        self.resume_output();

        let Some(track) = self.playlist.get(index).cloned() else {
            return;
        };

        self.state = PlaybackState::Loading;
        if let Err(e) = self.transport.set_track(&track) {
            error!("Failed to load {}: {}", track.url(), e);
            self.state = PlaybackState::Stopped;
            return;
        }

        if self.engine.state() == EngineState::Unconnected {
            self.connect_graph();
        }

        info!("Now playing [{}] {}", index, track.name());
        if let Some(callback) = self.on_track_change.as_mut() {
            callback(index, &track);
        }

        self.play();
    }

    fn connect_graph(&mut self) {
        let Some(sample_rate) = self.engine.sample_rate() else {
            return;
        };
        match self.transport.open_stream(sample_rate) {
            Ok(stream) => {
                if let Err(e) = self.engine.connect(stream) {
                    error!("Failed to connect signal graph: {}", e);
                }
            }
            Err(e) => error!("Failed to open transport stream: {}", e),
        }
    }

    fn resume_output(&mut self) {
        if self.engine.is_suspended() {
            if let Err(e) = self.engine.resume() {
                warn!("Failed to resume audio output: {}", e);
            }
        }
    }

    pub fn next(&mut self) {
        if let Some(index) = self.playlist.next_index() {
            self.load_track(index);
        }
    }

    pub fn prev(&mut self) {
        if let Some(index) = self.playlist.prev_index() {
            self.load_track(index);
        }
    }

    // =========================================================================
    // Transport controls
    // =========================================================================

    pub fn play(&mut self) {
        if let Err(e) = self.engine.init() {
            error!("Failed to initialize audio engine: {}", e);
            return;
        }
        self.resume_output();

        match self.transport.play() {
            Ok(()) => self.state = PlaybackState::Playing,
            Err(e) => {
                error!("Playback failed: {}", e);
                if self.state != PlaybackState::NoTrack {
                    self.state = PlaybackState::Paused;
                }
            }
        }
    }

    pub fn pause(&mut self) {
        if let Err(e) = self.transport.pause() {
            warn!("Pause failed: {}", e);
            return;
        }
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Pause and rewind to the start of the track
    pub fn stop(&mut self) {
        if let Err(e) = self.transport.stop() {
            warn!("Stop failed: {}", e);
            return;
        }
        if self.state != PlaybackState::NoTrack {
            self.state = PlaybackState::Stopped;
        }
    }

    pub fn seek(&mut self, seconds: f64) {
        if let Err(e) = self.transport.seek(seconds) {
            warn!("Seek to {:.2}s failed: {}", seconds, e);
        }
    }

    /// Playback position in seconds
    pub fn current_time(&self) -> f64 {
        self.transport.current_time()
    }

    /// Track length in seconds, once known
    pub fn duration(&self) -> Option<f64> {
        self.transport.duration()
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Drain transport notifications and run the matching callbacks
    ///
    /// The end of a track fires `on_ended` and then advances to the next
    /// track; after the last one the player is left stopped. Events left
    /// over from a track that is no longer current are dropped. Returns the
    /// number of events handled.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(TrackEvent { generation, event }) = self.transport.poll_event() {
            if generation != self.transport.generation() {
                debug!("Dropping {:?} from generation {}", event, generation);
                continue;
            }
            handled += 1;
            match event {
                TransportEvent::Loaded { duration } => {
                    debug!("Track loaded, duration {:?}", duration);
                }
                TransportEvent::TimeUpdate { position } => {
                    if let Some(callback) = self.on_time_update.as_mut() {
                        callback(position);
                    }
                }
                TransportEvent::Ended => {
                    debug!("Track ended");
                    self.state = PlaybackState::Stopped;
                    if let Some(callback) = self.on_ended.as_mut() {
                        callback();
                    }
                    self.next();
                }
                TransportEvent::Error { message } => {
                    error!("Transport error: {}", message);
                }
            }
        }
        handled
    }
}
