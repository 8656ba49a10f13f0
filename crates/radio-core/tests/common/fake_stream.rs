use std::sync::{Arc, Mutex};

use radio_core::error::StreamError;
use radio_core::protocol::PlayerEvent;
use radio_core::session::{HandleEvent, HandleEventKind, StreamBackend, StreamHandle};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Load(String, u64),
    Play,
    Pause,
    Volume(f32),
}

#[derive(Default)]
struct Shared {
    calls: Vec<Call>,
    generation: u64,
    refuse_play: bool,
}

/// Streaming backend that records every call.  Tests push lifecycle events
/// into the core channel with `emit`, as a real player would.
#[derive(Clone)]
pub struct FakeBackend {
    shared: Arc<Mutex<Shared>>,
    event_tx: mpsc::Sender<PlayerEvent>,
}

impl FakeBackend {
    pub fn new(event_tx: mpsc::Sender<PlayerEvent>) -> Self {
        Self {
            shared: Arc::default(),
            event_tx,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn pauses(&self) -> usize {
        self.count(&Call::Pause)
    }

    /// Generation of the most recent `load`.
    pub fn generation(&self) -> u64 {
        self.shared.lock().unwrap().generation
    }

    pub fn refuse_play(&self, refuse: bool) {
        self.shared.lock().unwrap().refuse_play = refuse;
    }

    /// Queue a lifecycle event for the current stream.
    pub fn emit(&self, kind: HandleEventKind) {
        self.emit_for(self.generation(), kind);
    }

    pub fn emit_for(&self, generation: u64, kind: HandleEventKind) {
        self.event_tx
            .try_send(PlayerEvent::Stream(HandleEvent { generation, kind }))
            .expect("event channel has room");
    }
}

pub struct FakeHandle {
    shared: Arc<Mutex<Shared>>,
}

impl StreamHandle for FakeHandle {
    fn load(&mut self, url: &str, generation: u64) {
        let mut shared = self.shared.lock().unwrap();
        shared.generation = generation;
        shared.calls.push(Call::Load(url.to_string(), generation));
    }

    fn play(&mut self) -> Result<(), StreamError> {
        let mut shared = self.shared.lock().unwrap();
        shared.calls.push(Call::Play);
        if shared.refuse_play {
            Err(StreamError::Rejected("refused by test".into()))
        } else {
            Ok(())
        }
    }

    fn pause(&mut self) {
        self.shared.lock().unwrap().calls.push(Call::Pause);
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.lock().unwrap().calls.push(Call::Volume(volume));
    }
}

impl StreamBackend for FakeBackend {
    type Handle = FakeHandle;

    fn open(&mut self, _volume: f32) -> Result<FakeHandle, StreamError> {
        self.shared.lock().unwrap().calls.push(Call::Open);
        Ok(FakeHandle {
            shared: self.shared.clone(),
        })
    }
}
