#![allow(dead_code)]

pub mod fake_stream;

use std::sync::{Arc, Mutex};

use radio_core::config::Config;
use radio_core::core::{PlayerCore, EVENT_CHANNEL_CAPACITY, NOTICE_CHANNEL_CAPACITY};
use radio_core::error::ExportError;
use radio_core::protocol::{Command, PlayerEvent, Reply};
use radio_core::error::SourceError;
use radio_core::source::{DefaultSource, ExportSink};
use radio_core::storage::MemoryStore;
use radio_core::CoreError;
use tokio::sync::{broadcast, mpsc, oneshot};

use fake_stream::FakeBackend;

pub const DEFAULTS: &str = "StationName,Url,Logo,Category\n\
                            Groove Salad,https://ice.somafm.example/groovesalad,,Ambient\n\
                            FIP,https://fip.example/live,fip.svg,Eclectic\n\
                            KEXP,https://kexp.example/live,,Indie";

/// Default list provider: fixed text, or a server that always fails.
pub enum TestSource {
    Text(String),
    Unreachable,
}

impl DefaultSource for TestSource {
    async fn fetch(&self) -> Result<String, SourceError> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Unreachable => Err(SourceError::Status(503)),
        }
    }
}

/// Captures exports in memory.
#[derive(Default)]
pub struct MemorySink {
    pub saved: Mutex<Vec<(String, String)>>,
}

impl ExportSink for MemorySink {
    fn save(&self, filename: &str, contents: &str) -> Result<(), ExportError> {
        self.saved
            .lock()
            .unwrap()
            .push((filename.to_string(), contents.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub core: PlayerCore<FakeBackend, TestSource>,
    pub events: mpsc::Receiver<PlayerEvent>,
    pub event_tx: mpsc::Sender<PlayerEvent>,
    pub backend: FakeBackend,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub async fn new(defaults: &str) -> Self {
        Self::with_store(defaults, MemoryStore::shared()).await
    }

    pub async fn with_store(defaults: &str, store: Arc<MemoryStore>) -> Self {
        Self::build(TestSource::Text(defaults.to_string()), store).await
    }

    pub async fn new_unreachable() -> Self {
        Self::build(TestSource::Unreachable, MemoryStore::shared()).await
    }

    async fn build(source: TestSource, store: Arc<MemoryStore>) -> Self {
        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let backend = FakeBackend::new(event_tx.clone());
        let sink = Arc::new(MemorySink::default());

        let mut core = PlayerCore::new(
            &Config::default(),
            store.clone(),
            backend.clone(),
            source,
            sink.clone(),
            event_tx.clone(),
            notice_tx,
        );
        core.start().await;

        Self {
            core,
            events,
            event_tx,
            backend,
            store,
            sink,
        }
    }

    /// Run one command through the core and return its result.
    pub async fn request(&mut self, cmd: Command) -> Result<Reply, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.core
            .handle_event(PlayerEvent::Command {
                cmd,
                reply: Some(tx),
            })
            .await;
        rx.await.expect("core always replies")
    }

    /// Feed every event already queued (stream events, ticks) into the core.
    pub async fn drain(&mut self) {
        while let Ok(evt) = self.events.try_recv() {
            self.core.handle_event(evt).await;
        }
    }

    pub fn station_id(&self, name: &str) -> String {
        self.core
            .catalog()
            .stations()
            .iter()
            .find(|s| s.display_name == name)
            .map(|s| s.id.clone())
            .unwrap_or_else(|| panic!("no station named {name}"))
    }
}
