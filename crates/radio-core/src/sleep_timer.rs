//! Sleep timer. Counts down once per second and stops playback at zero.
//!
//! The countdown state lives here and is only touched from the core loop.
//! Ticks come from one spawned task that sends `PlayerEvent::TimerTick` into
//! the core's event channel.  Each arm gets a new generation, so a tick that
//! was already queued when the countdown was cancelled or re-armed is
//! recognised and dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::TimerError;
use crate::protocol::PlayerEvent;

pub const MAX_MINUTES: u32 = 480;

/// Durations offered by the UI.
pub const PRESET_MINUTES: [u32; 4] = [15, 30, 45, 60];

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepTimerState {
    pub remaining_seconds: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stale or inactive; nothing changed.
    Ignored,
    /// Still counting; seconds left.
    Counting(u32),
    /// Just reached zero.  The caller pauses playback.
    Expired,
}

pub struct SleepTimer {
    state: SleepTimerState,
    generation: u64,
    ticker: Option<AbortHandle>,
    event_tx: mpsc::Sender<PlayerEvent>,
}

impl SleepTimer {
    pub fn new(event_tx: mpsc::Sender<PlayerEvent>) -> Self {
        Self {
            state: SleepTimerState::default(),
            generation: 0,
            ticker: None,
            event_tx,
        }
    }

    pub fn state(&self) -> SleepTimerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Start a countdown of `minutes`, replacing any running one.
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, minutes: u32) -> Result<(), TimerError> {
        if !(1..=MAX_MINUTES).contains(&minutes) {
            return Err(TimerError::OutOfRange {
                got: minutes,
                max: MAX_MINUTES,
            });
        }

        self.stop_ticker();
        self.generation += 1;
        self.state = SleepTimerState {
            remaining_seconds: minutes * 60,
            active: true,
        };

        let generation = self.generation;
        let tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK, TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(PlayerEvent::TimerTick { generation }).await.is_err() {
                    break;
                }
            }
        });
        self.ticker = Some(task.abort_handle());

        info!("sleep timer: armed for {} min (gen {})", minutes, generation);
        Ok(())
    }

    /// Stop the countdown without pausing.  Safe to call when inactive.
    pub fn cancel(&mut self) {
        if self.state.active {
            info!("sleep timer: cancelled");
        }
        self.stop_ticker();
        self.state = SleepTimerState::default();
    }

    pub fn on_tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation || !self.state.active {
            debug!("sleep timer: ignoring tick gen={}", generation);
            return TickOutcome::Ignored;
        }

        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);
        if self.state.remaining_seconds > 0 {
            return TickOutcome::Counting(self.state.remaining_seconds);
        }

        info!("sleep timer: expired");
        self.stop_ticker();
        self.state.active = false;
        TickOutcome::Expired
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for SleepTimer {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// `mm:ss` for display.
pub fn format_remaining(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
