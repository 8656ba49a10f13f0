/// PlayerCore: single-owner event loop for the catalog, the playback
/// session and the sleep timer.
///
/// Every input arrives as a `PlayerEvent` on one mpsc channel: collaborator
/// commands, lifecycle events from the streaming handle, and sleep timer
/// ticks.  They are handled one at a time, in arrival order, so no state is
/// shared and nothing needs a lock.
///
/// After each event the core rebuilds a `PlayerSnapshot` and publishes it on
/// a `watch` channel when it differs from the last one.  Transient messages
/// (command results, errors) go out on a `broadcast` channel as `Notice`s.
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, Direction};
use crate::config::Config;
use crate::error::CoreError;
use crate::protocol::{Command, Notice, PlayerEvent, PlayerSnapshot, Reply};
use crate::session::{Phase, PlaybackSession, StreamBackend};
use crate::sleep_timer::{format_remaining, SleepTimer, TickOutcome};
use crate::source::{DefaultSource, ExportSink};
use crate::storage::SharedStore;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;
pub const NOTICE_CHANNEL_CAPACITY: usize = 64;

pub struct PlayerCore<B: StreamBackend, S: DefaultSource> {
    catalog: Catalog,
    session: PlaybackSession<B>,
    timer: SleepTimer,
    source: S,
    export_sink: Arc<dyn ExportSink>,
    snapshot_tx: watch::Sender<PlayerSnapshot>,
    notice_tx: broadcast::Sender<Notice>,
}

impl<B: StreamBackend, S: DefaultSource> PlayerCore<B, S> {
    /// `event_tx` must feed the receiver later passed to `run`; the sleep
    /// timer sends its ticks through it.
    pub fn new(
        config: &Config,
        store: SharedStore,
        backend: B,
        source: S,
        export_sink: Arc<dyn ExportSink>,
        event_tx: mpsc::Sender<PlayerEvent>,
        notice_tx: broadcast::Sender<Notice>,
    ) -> Self {
        let session =
            PlaybackSession::new(backend, store.clone(), config.player.default_volume);
        let catalog = Catalog::new(store);
        let timer = SleepTimer::new(event_tx);

        let (snapshot_tx, _) = watch::channel(PlayerSnapshot {
            rev: 1,
            playback: session.state().clone(),
            stations: Vec::new(),
            sleep_timer: timer.state(),
            load_error: None,
        });

        Self {
            catalog,
            session,
            timer,
            source,
            export_sink,
            snapshot_tx,
            notice_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    pub fn notice_sender(&self) -> broadcast::Sender<Notice> {
        self.notice_tx.clone()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn session(&self) -> &PlaybackSession<B> {
        &self.session
    }

    pub fn timer(&self) -> &SleepTimer {
        &self.timer
    }

    /// Hydrate the catalog.  Call once before `run`.
    pub async fn start(&mut self) {
        self.catalog.load(&self.source).await;
        if let Some(e) = self.catalog.load_error() {
            self.notify(Notice::error(e));
        }
        self.publish();
    }

    /// Run until `Shutdown` arrives or every sender is dropped.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) {
        info!("PlayerCore: starting event loop");

        loop {
            match event_rx.recv().await {
                None => {
                    info!("PlayerCore: event channel closed, shutting down");
                    break;
                }
                Some(PlayerEvent::Shutdown) => {
                    info!("PlayerCore: shutdown requested");
                    break;
                }
                Some(evt) => self.handle_event(evt).await,
            }
        }

        self.timer.cancel();
        self.session.pause();
    }

    pub async fn handle_event(&mut self, evt: PlayerEvent) {
        match evt {
            PlayerEvent::Command { cmd, reply } => {
                debug!("PlayerCore: command {:?}", cmd);
                let result = self.handle_command(cmd).await;
                if let Err(e) = &result {
                    error!("PlayerCore: command error: {}", e);
                    self.notify(Notice::error(e.to_string()));
                }
                if let Some(reply) = reply {
                    // Requester may have given up waiting.
                    let _ = reply.send(result);
                }
            }

            PlayerEvent::Stream(evt) => {
                let was_errored = self.session.phase() == Phase::Errored;
                if self.session.on_event(evt) && !was_errored {
                    if let Some(e) = &self.session.state().last_error {
                        self.notify(Notice::error(e.clone()));
                    }
                }
            }

            PlayerEvent::TimerTick { generation } => match self.timer.on_tick(generation) {
                TickOutcome::Expired => {
                    info!("PlayerCore: sleep timer expired, pausing");
                    self.session.pause();
                    self.notify(Notice::info("Sleep timer finished"));
                }
                TickOutcome::Counting(_) | TickOutcome::Ignored => {}
            },

            // Handled by `run`; a direct caller gets a no-op.
            PlayerEvent::Shutdown => {}
        }

        self.publish();
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<Reply, CoreError> {
        match cmd {
            Command::Play { station_id } => {
                let station = self
                    .catalog
                    .get(&station_id)
                    .cloned()
                    .ok_or(CoreError::UnknownStation(station_id))?;
                self.session.play_station(&station);
                self.report_start_failure();
                Ok(Reply::Ok)
            }

            Command::TogglePause => {
                let Some(current) = self.session.current_station().cloned() else {
                    debug!("PlayerCore: toggle with nothing selected");
                    return Ok(Reply::Ok);
                };
                if self.session.phase() == Phase::Playing {
                    self.session.pause();
                } else {
                    self.session.play_station(&current);
                    self.report_start_failure();
                }
                Ok(Reply::Ok)
            }

            Command::Pause => {
                self.session.pause();
                Ok(Reply::Ok)
            }

            Command::Next => self.step(Direction::Next),
            Command::Prev => self.step(Direction::Prev),

            Command::Volume { value } => {
                let value = self.session.set_volume(value);
                Ok(Reply::Volume { value })
            }

            Command::AddStation { station } => {
                let station = self.catalog.add(&station)?;
                self.notify(Notice::info(format!("Added {}", station.display_name)));
                Ok(Reply::Station { station })
            }

            Command::EditStation { id, station } => {
                let station = self.catalog.edit(&id, &station)?;
                Ok(Reply::Station { station })
            }

            Command::DeleteStation { id } => {
                let removed = self.catalog.delete(&id)?;
                Ok(Reply::Deleted { removed })
            }

            Command::Import { text } => {
                let summary = self.catalog.import(&text)?;
                self.notify(Notice::info(import_message(
                    summary.imported_count,
                    summary.skipped_count,
                )));
                Ok(Reply::Imported { summary })
            }

            Command::ImportFile { path } => {
                let summary = self.catalog.import_file(&path).await?;
                self.notify(Notice::info(import_message(
                    summary.imported_count,
                    summary.skipped_count,
                )));
                Ok(Reply::Imported { summary })
            }

            Command::Export => {
                let text = self.catalog.export(&*self.export_sink)?;
                Ok(Reply::Exported {
                    filename: crate::codec::EXPORT_FILENAME.to_string(),
                    text,
                })
            }

            Command::Reset { keep_custom } => {
                let count = self.catalog.reset(&self.source, keep_custom).await?;
                self.notify(Notice::info(format!("Reset to {} stations", count)));
                Ok(Reply::Reset { count })
            }

            Command::ArmSleepTimer { minutes } => {
                self.timer.arm(minutes)?;
                self.notify(Notice::info(format!(
                    "Sleep timer set: {}",
                    format_remaining(self.timer.state().remaining_seconds)
                )));
                Ok(Reply::Ok)
            }

            Command::CancelSleepTimer => {
                self.timer.cancel();
                Ok(Reply::Ok)
            }

            Command::DismissError => {
                self.session.clear_error();
                Ok(Reply::Ok)
            }

            Command::GetState => {
                let rev = self.snapshot_tx.borrow().rev;
                Ok(Reply::State {
                    data: self.build_snapshot(rev),
                })
            }
        }
    }

    /// Play the station next to the current one.  At either end of the list,
    /// or with nothing selected, nothing happens.  If the current station was
    /// deleted, `Next` starts from the top.
    fn step(&mut self, direction: Direction) -> Result<Reply, CoreError> {
        let target = self
            .session
            .current_station()
            .and_then(|cur| self.catalog.neighbour(&cur.id, direction))
            .cloned();
        match target {
            Some(station) => {
                self.session.play_station(&station);
                self.report_start_failure();
            }
            None => debug!("PlayerCore: no {:?} station", direction),
        }
        Ok(Reply::Ok)
    }

    fn report_start_failure(&self) {
        if self.session.phase() == Phase::Errored {
            if let Some(e) = &self.session.state().last_error {
                self.notify(Notice::error(e.clone()));
            }
        }
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notice_tx.send(notice);
    }

    fn build_snapshot(&self, rev: u64) -> PlayerSnapshot {
        PlayerSnapshot {
            rev,
            playback: self.session.state().clone(),
            stations: self.catalog.stations().to_vec(),
            sleep_timer: self.timer.state(),
            load_error: self.catalog.load_error().map(str::to_string),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_if_modified(|current| {
            let mut next = self.build_snapshot(current.rev);
            if next == *current {
                return false;
            }
            next.rev = current.rev + 1;
            *current = next;
            true
        });
    }
}

fn import_message(imported: usize, skipped: usize) -> String {
    if skipped == 0 {
        format!("Imported {} stations", imported)
    } else {
        format!(
            "Imported {} stations, skipped {} duplicates",
            imported, skipped
        )
    }
}

// ── client side ───────────────────────────────────────────────────────────────

/// Cheap, cloneable handle for talking to a running `PlayerCore`.
#[derive(Clone)]
pub struct PlayerClient {
    event_tx: mpsc::Sender<PlayerEvent>,
    snapshot_rx: watch::Receiver<PlayerSnapshot>,
    notice_tx: broadcast::Sender<Notice>,
}

impl PlayerClient {
    pub fn new(
        event_tx: mpsc::Sender<PlayerEvent>,
        snapshot_rx: watch::Receiver<PlayerSnapshot>,
        notice_tx: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            event_tx,
            snapshot_rx,
            notice_tx,
        }
    }

    /// Send `cmd` and wait for its result.
    pub async fn request(&self, cmd: Command) -> Result<Reply, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.event_tx
            .send(PlayerEvent::Command {
                cmd,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| CoreError::Closed)?;
        reply_rx.await.map_err(|_| CoreError::Closed)?
    }

    /// Send `cmd` without waiting.
    pub async fn send(&self, cmd: Command) -> Result<(), CoreError> {
        self.event_tx
            .send(PlayerEvent::command(cmd))
            .await
            .map_err(|_| CoreError::Closed)
    }

    pub async fn shutdown(&self) {
        if self.event_tx.send(PlayerEvent::Shutdown).await.is_err() {
            warn!("PlayerClient: core already stopped");
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }
}
