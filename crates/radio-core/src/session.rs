//! Playback session: the one live stream and its state machine.
//!
//! The session owns a single streaming handle, created on first use and
//! kept for the life of the session.  Commands (`play_station`, `pause`,
//! `set_volume`) poke the handle; the handle reports what actually happens
//! through `HandleEvent`s, which `on_event` reduces into `PlaybackState`.
//!
//! ```text
//!            play_station(X)              Playing event
//!   Idle ─────────────────────► Loading ─────────────────► Playing
//!                                 ▲  ▲ Waiting event          │
//!                                 │  └────────────────────────┤
//!         play_station(same)      │         Paused event      ▼
//!   Errored ◄──── Failed event ───┴──────────────────────── Paused
//! ```
//!
//! Every `load` bumps a generation counter and the handle tags its events
//! with the generation it was serving.  Events from an older generation are
//! dropped, so a late error from a stream we already navigated away from
//! cannot clobber the state of the current one.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::station::StationRecord;
use crate::storage::{load_json, save_json, SharedStore, VOLUME_KEY};

pub const DEFAULT_VOLUME: f32 = 0.7;

pub const START_FAILED_MESSAGE: &str = "Failed to play stream. Try clicking again.";
pub const STREAM_FAILED_MESSAGE: &str = "Failed to connect to stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Errored,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_station: Option<StationRecord>,
    pub phase: Phase,
    pub volume: f32,
    pub last_error: Option<String>,
}

/// Lifecycle notifications from the streaming handle.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleEvent {
    /// Generation of the `load` this event belongs to.
    pub generation: u64,
    pub kind: HandleEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandleEventKind {
    /// Audio is flowing.
    Playing,
    /// Stalled / buffering.
    Waiting,
    /// The handle paused (on request or by itself).
    Paused,
    /// Fatal error for the current stream.
    Failed(String),
}

/// The streaming media primitive.
pub trait StreamHandle: Send {
    /// Point the handle at a new stream.  Events for it carry `generation`.
    fn load(&mut self, url: &str, generation: u64);
    /// Ask for playback of whatever is loaded.  May be refused outright.
    fn play(&mut self) -> Result<(), StreamError>;
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f32);
}

/// Creates the session's one streaming handle.
pub trait StreamBackend: Send {
    type Handle: StreamHandle;

    fn open(&mut self, volume: f32) -> Result<Self::Handle, StreamError>;
}

pub struct PlaybackSession<B: StreamBackend> {
    backend: B,
    handle: Option<B::Handle>,
    store: SharedStore,
    state: PlaybackState,
    generation: u64,
    /// Generation whose URL the handle actually holds.
    loaded_generation: Option<u64>,
}

impl<B: StreamBackend> PlaybackSession<B> {
    /// Volume is restored from the store, else `default_volume`.
    pub fn new(backend: B, store: SharedStore, default_volume: f32) -> Self {
        let volume = load_json::<f32>(&*store, VOLUME_KEY)
            .unwrap_or(default_volume);
        let volume = clamp_volume(volume);
        debug!("session: initial volume {:.2}", volume);

        Self {
            backend,
            handle: None,
            store,
            state: PlaybackState {
                current_station: None,
                phase: Phase::Idle,
                volume,
                last_error: None,
            },
            generation: 0,
            loaded_generation: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn current_station(&self) -> Option<&StationRecord> {
        self.state.current_station.as_ref()
    }

    pub fn volume(&self) -> f32 {
        self.state.volume
    }

    /// Generation of the stream most recently loaded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn play_station(&mut self, station: &StationRecord) {
        let same = self
            .state
            .current_station
            .as_ref()
            .is_some_and(|cur| cur.id == station.id);

        // Resuming only makes sense when the handle holds this stream.
        let resumable = same && self.loaded_generation == Some(self.generation);

        if resumable {
            match self.state.phase {
                Phase::Playing => {
                    info!("session: '{}' playing → pause", station.display_name);
                    if let Some(handle) = self.handle.as_mut() {
                        handle.pause();
                    }
                    self.state.phase = Phase::Paused;
                    return;
                }
                Phase::Paused | Phase::Errored => {
                    info!("session: resuming '{}'", station.display_name);
                    self.state.last_error = None;
                    self.state.phase = Phase::Loading;
                    self.request_play();
                    return;
                }
                // Still connecting (or never started): reload below.
                Phase::Loading | Phase::Idle => {}
            }
        }

        self.generation += 1;
        info!(
            "session: loading '{}' gen={} url={}",
            station.display_name, self.generation, station.stream_url
        );
        self.state.current_station = Some(station.clone());
        self.state.phase = Phase::Loading;
        self.state.last_error = None;

        let generation = self.generation;
        match self.ensure_handle() {
            Ok(handle) => handle.load(&station.stream_url, generation),
            Err(e) => {
                self.loaded_generation = None;
                self.fail_start(e);
                return;
            }
        }
        self.loaded_generation = Some(generation);
        self.request_play();
    }

    /// Ask the handle to pause.  The phase follows the handle's `Paused` event.
    pub fn pause(&mut self) {
        match self.handle.as_mut() {
            Some(handle) => {
                debug!("session: pause requested");
                handle.pause();
            }
            None => debug!("session: pause with no handle"),
        }
    }

    /// Clamp to [0, 1], apply, persist.  Returns the applied volume.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.state.volume = volume;
        if let Some(handle) = self.handle.as_mut() {
            handle.set_volume(volume);
        }
        if let Err(e) = save_json(&*self.store, VOLUME_KEY, &volume) {
            warn!("session: could not persist volume: {}", e);
        }
        volume
    }

    /// Dismiss the current error notice.  Returns whether there was one.
    pub fn clear_error(&mut self) -> bool {
        self.state.last_error.take().is_some()
    }

    /// Reduce one handle event.  Returns whether the observable state changed.
    pub fn on_event(&mut self, event: HandleEvent) -> bool {
        if event.generation != self.generation {
            debug!(
                "session: dropping stale {:?} (gen {} != {})",
                event.kind, event.generation, self.generation
            );
            return false;
        }
        if self.state.current_station.is_none() {
            debug!("session: dropping {:?}, no station selected", event.kind);
            return false;
        }

        let before = (self.state.phase, self.state.last_error.clone());
        match event.kind {
            HandleEventKind::Playing => {
                self.state.phase = Phase::Playing;
                self.state.last_error = None;
            }
            HandleEventKind::Waiting => {
                self.state.phase = Phase::Loading;
            }
            HandleEventKind::Paused => {
                self.state.phase = Phase::Paused;
            }
            HandleEventKind::Failed(reason) => {
                warn!("session: stream failed: {}", reason);
                self.state.phase = Phase::Errored;
                self.state.last_error = Some(STREAM_FAILED_MESSAGE.to_string());
            }
        }

        let changed = before != (self.state.phase, self.state.last_error.clone());
        if changed {
            info!("session: phase {:?} → {:?}", before.0, self.state.phase);
        }
        changed
    }

    fn ensure_handle(&mut self) -> Result<&mut B::Handle, StreamError> {
        if self.handle.is_none() {
            info!("session: opening stream handle");
            let handle = self.backend.open(self.state.volume)?;
            self.handle = Some(handle);
        }
        // Just populated above.
        self.handle
            .as_mut()
            .ok_or_else(|| StreamError::Open("handle missing".into()))
    }

    fn request_play(&mut self) {
        let result = match self.ensure_handle() {
            Ok(handle) => handle.play(),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.fail_start(e);
        }
    }

    fn fail_start(&mut self, e: StreamError) {
        warn!("session: start failed: {}", e);
        self.state.phase = Phase::Errored;
        self.state.last_error = Some(START_FAILED_MESSAGE.to_string());
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}
