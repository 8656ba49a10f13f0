use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::catalog::ImportSummary;
use crate::error::CoreError;
use crate::session::{HandleEvent, PlaybackState};
use crate::sleep_timer::SleepTimerState;
use crate::station::{NewStation, StationRecord};

/// Requests from collaborators (HTTP API, CLI, tests) to the player core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    Play { station_id: String },
    /// Pause if playing, otherwise (re)start the current station.
    TogglePause,
    Pause,
    Next,
    Prev,
    Volume { value: f32 },
    AddStation { station: NewStation },
    EditStation { id: String, station: NewStation },
    DeleteStation { id: String },
    Import { text: String },
    ImportFile { path: PathBuf },
    Export,
    Reset { keep_custom: bool },
    ArmSleepTimer { minutes: u32 },
    CancelSleepTimer,
    DismissError,
    GetState,
}

/// Successful command outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    State { data: PlayerSnapshot },
    Station { station: StationRecord },
    Deleted { removed: bool },
    Imported { summary: ImportSummary },
    Exported { filename: String, text: String },
    Reset { count: usize },
    Volume { value: f32 },
}

pub type ReplyTx = oneshot::Sender<Result<Reply, CoreError>>;

/// Everything the core loop reacts to, on one channel.
#[derive(Debug)]
pub enum PlayerEvent {
    Command {
        cmd: Command,
        reply: Option<ReplyTx>,
    },
    /// Lifecycle notification from the streaming handle.
    Stream(HandleEvent),
    /// One second elapsed on the sleep timer countdown `generation`.
    TimerTick { generation: u64 },
    Shutdown,
}

impl PlayerEvent {
    /// A fire-and-forget command.
    pub fn command(cmd: Command) -> Self {
        Self::Command { cmd, reply: None }
    }
}

/// Read-only view published after every change.  `rev` increases only when
/// the content differs from the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub rev: u64,
    pub playback: PlaybackState,
    pub stations: Vec<StationRecord>,
    pub sleep_timer: SleepTimerState,
    pub load_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
    /// Forwarded log line.
    Log,
}

/// Transient message for collaborators (toasts, log panes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Log,
            message: message.into(),
        }
    }
}
