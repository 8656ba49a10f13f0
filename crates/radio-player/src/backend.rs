//! mpv-backed streaming handle.
//!
//! `MpvStream` is the synchronous face the playback session talks to; every
//! call is queued to a worker task that owns the mpv process and its IPC
//! connection.  The worker turns observed mpv properties into lifecycle
//! events for the core:
//!
//! | mpv                                   | event     |
//! |---------------------------------------|-----------|
//! | `pause` → true                        | `Paused`  |
//! | `core-idle` → false                   | `Playing` |
//! | `core-idle` → true while loaded       | `Waiting` |
//! | `end-file` reason `error` / `network` | `Failed`  |
//! | no audio 15 s after load / resume     | `Failed`  |
//! | process died                          | `Failed`  |
//!
//! Events are tagged with the generation of the stream mpv was actually
//! serving, which only changes on `start-file`.  A late `end-file` from the
//! previous stream therefore carries the previous generation.

use std::time::Duration;

use radio_core::error::StreamError;
use radio_core::platform;
use radio_core::protocol::PlayerEvent;
use radio_core::session::{HandleEvent, HandleEventKind, StreamBackend, StreamHandle};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::mpv::{MpvDriver, MpvEvent, MpvHandle, OBS_CORE_IDLE, OBS_PAUSE};

/// Give up on a stream that has not produced audio after this long.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const HEARTBEAT: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum WorkerCmd {
    Load { url: String, generation: u64 },
    Play,
    Pause,
    Volume(f32),
}

pub struct MpvBackend {
    event_tx: mpsc::Sender<PlayerEvent>,
}

impl MpvBackend {
    pub fn new(event_tx: mpsc::Sender<PlayerEvent>) -> Self {
        Self { event_tx }
    }
}

impl StreamBackend for MpvBackend {
    type Handle = MpvStream;

    fn open(&mut self, volume: f32) -> Result<MpvStream, StreamError> {
        if platform::find_mpv_binary().is_none() {
            return Err(StreamError::Open("mpv binary not found".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StreamError::Open(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = Worker::new(volume, self.event_tx.clone());
        runtime.spawn(worker.run(cmd_rx));
        info!("mpv backend: worker started");
        Ok(MpvStream { cmd_tx })
    }
}

/// Dropping the stream stops the worker and kills mpv.
pub struct MpvStream {
    cmd_tx: mpsc::UnboundedSender<WorkerCmd>,
}

impl MpvStream {
    fn queue(&self, cmd: WorkerCmd) -> Result<(), StreamError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| StreamError::Rejected("mpv worker stopped".into()))
    }
}

impl StreamHandle for MpvStream {
    fn load(&mut self, url: &str, generation: u64) {
        let cmd = WorkerCmd::Load {
            url: url.to_string(),
            generation,
        };
        if let Err(e) = self.queue(cmd) {
            warn!("mpv backend: load dropped: {}", e);
        }
    }

    fn play(&mut self) -> Result<(), StreamError> {
        self.queue(WorkerCmd::Play)
    }

    fn pause(&mut self) {
        if let Err(e) = self.queue(WorkerCmd::Pause) {
            warn!("mpv backend: pause dropped: {}", e);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        if let Err(e) = self.queue(WorkerCmd::Volume(volume)) {
            warn!("mpv backend: volume dropped: {}", e);
        }
    }
}

// ── worker ────────────────────────────────────────────────────────────────────

struct Worker {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    mpv_event_rx: Option<mpsc::Receiver<MpvEvent>>,
    event_tx: mpsc::Sender<PlayerEvent>,
    volume: f32,
    /// URL and generation of the most recent load request.
    requested: Option<(String, u64)>,
    /// Generation of the stream mpv is actually serving.
    serving: u64,
    loaded: bool,
    obs_pause: bool,
    obs_core_idle: Option<bool>,
    /// When we started waiting for audio (to detect timeout).
    connecting_since: Option<Instant>,
}

impl Worker {
    fn new(volume: f32, event_tx: mpsc::Sender<PlayerEvent>) -> Self {
        Self {
            driver: MpvDriver::new(volume),
            handle: None,
            mpv_event_rx: None,
            event_tx,
            volume,
            requested: None,
            serving: 0,
            loaded: false,
            obs_pause: false,
            obs_core_idle: None,
            connecting_since: None,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<WorkerCmd>) {
        let mut heartbeat = tokio::time::interval(HEARTBEAT);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_cmd(cmd).await,
                    None => break,
                },
                Some(evt) = recv_mpv(&mut self.mpv_event_rx) => {
                    self.handle_mpv_event(evt).await;
                }
                _ = heartbeat.tick() => self.check_health().await,
            }
        }

        info!("mpv backend: stream handle dropped, stopping mpv");
        self.driver.kill().await;
    }

    async fn handle_cmd(&mut self, cmd: WorkerCmd) {
        debug!("mpv backend: {:?}", cmd);
        match cmd {
            WorkerCmd::Load { url, generation } => {
                self.requested = Some((url.clone(), generation));
                let result = match self.connect().await {
                    Ok(h) => h.load_stream(&url).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => {
                        self.loaded = true;
                        self.connecting_since = Some(Instant::now());
                    }
                    Err(e) => self.emit_for(generation, HandleEventKind::Failed(e.to_string())).await,
                }
            }

            WorkerCmd::Play => {
                let fresh = self.handle.is_none();
                let result = match self.connect().await {
                    Ok(h) => {
                        // Fresh process, or the last stream ended: load it again.
                        let reload = match &self.requested {
                            Some((url, _)) if fresh || !self.loaded => Some(url.clone()),
                            _ => None,
                        };
                        let loaded = match reload {
                            Some(url) => h.load_stream(&url).await,
                            None => Ok(()),
                        };
                        loaded.map(|()| h)
                    }
                    Err(e) => Err(e),
                };
                match result {
                    Ok(h) => {
                        if let Err(e) = h.set_pause(false).await {
                            warn!("mpv backend: unpause failed: {}", e);
                        }
                        self.loaded = self.requested.is_some();
                        self.connecting_since = Some(Instant::now());
                    }
                    Err(e) => self.emit(HandleEventKind::Failed(e.to_string())).await,
                }
            }

            WorkerCmd::Pause => {
                if let Some(h) = &self.handle {
                    if let Err(e) = h.set_pause(true).await {
                        warn!("mpv backend: pause failed: {}", e);
                    }
                }
                self.connecting_since = None;
            }

            WorkerCmd::Volume(volume) => {
                self.volume = volume;
                self.driver.last_volume = volume;
                if let Some(h) = &self.handle {
                    if let Err(e) = h.set_volume(volume).await {
                        warn!("mpv backend: set volume failed: {}", e);
                    }
                }
            }
        }
    }

    async fn handle_mpv_event(&mut self, evt: MpvEvent) {
        if let Some((obs_id, data)) = evt.as_property_change() {
            match obs_id {
                OBS_PAUSE => {
                    let val = data.as_bool().unwrap_or(false);
                    if val != self.obs_pause {
                        debug!("mpv: pause → {}", val);
                        self.obs_pause = val;
                        if val && self.loaded {
                            self.connecting_since = None;
                            self.emit_for(self.serving, HandleEventKind::Paused).await;
                        }
                    }
                }
                OBS_CORE_IDLE => {
                    let val = data.as_bool();
                    if val != self.obs_core_idle {
                        debug!("mpv: core-idle → {:?}", val);
                        self.obs_core_idle = val;
                        match val {
                            Some(false) => {
                                self.connecting_since = None;
                                self.emit_for(self.serving, HandleEventKind::Playing).await;
                            }
                            Some(true) if self.loaded && !self.obs_pause => {
                                self.connecting_since.get_or_insert_with(Instant::now);
                                self.emit_for(self.serving, HandleEventKind::Waiting).await;
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        match evt.event_name() {
            Some("start-file") => {
                if let Some((_, generation)) = &self.requested {
                    self.serving = *generation;
                }
                info!("mpv: start-file gen={}", self.serving);
            }
            Some("end-file") => {
                let reason = evt.end_reason().unwrap_or("unknown");
                info!("mpv: end-file reason={} gen={}", reason, self.serving);
                if reason == "error" || reason == "network" {
                    let generation = self.serving;
                    if self.requested.as_ref().map(|(_, g)| *g) == Some(generation) {
                        self.loaded = false;
                        self.connecting_since = None;
                    }
                    self.emit_for(generation, HandleEventKind::Failed(format!("end-file: {}", reason)))
                        .await;
                }
            }
            _ => {}
        }
    }

    async fn check_health(&mut self) {
        if self.handle.is_some() && !self.driver.process_alive() {
            warn!("mpv backend: mpv process died");
            self.disconnect();
            if self.loaded {
                self.loaded = false;
                self.emit(HandleEventKind::Failed("mpv exited".into())).await;
            }
            return;
        }

        if let Some(since) = self.connecting_since {
            if since.elapsed() >= CONNECT_TIMEOUT && !self.obs_pause {
                warn!("mpv backend: no audio after {:?}", CONNECT_TIMEOUT);
                self.connecting_since = None;
                self.emit(HandleEventKind::Failed("connect timeout".into())).await;
            }
        }
    }

    /// Current IPC handle, spawning mpv first if needed.
    async fn connect(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(h) = &self.handle {
            return Ok(h.clone());
        }

        let (tx, rx) = mpsc::channel(256);
        self.driver.last_volume = self.volume;
        let handle = self.driver.spawn_and_connect(tx).await?;
        handle.observe_all_properties().await;
        self.mpv_event_rx = Some(rx);
        self.handle = Some(handle.clone());
        self.obs_pause = false;
        self.obs_core_idle = None;
        self.loaded = false;
        Ok(handle)
    }

    fn disconnect(&mut self) {
        self.handle = None;
        self.mpv_event_rx = None;
        self.obs_core_idle = None;
    }

    /// Emit for the latest requested stream.  Property changes use
    /// `emit_for(self.serving, ..)` instead.
    async fn emit(&self, kind: HandleEventKind) {
        let generation = self.requested.as_ref().map(|(_, g)| *g).unwrap_or(0);
        self.emit_for(generation, kind).await;
    }

    async fn emit_for(&self, generation: u64, kind: HandleEventKind) {
        let evt = PlayerEvent::Stream(HandleEvent { generation, kind });
        if self.event_tx.send(evt).await.is_err() {
            debug!("mpv backend: core gone, event dropped");
        }
    }
}

async fn recv_mpv(rx: &mut Option<mpsc::Receiver<MpvEvent>>) -> Option<MpvEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
