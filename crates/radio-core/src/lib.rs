//! Internet-radio player core: station catalog, playback session and sleep
//! timer, driven by a single-owner event loop.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod core;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod session;
pub mod sleep_timer;
pub mod source;
pub mod station;
pub mod storage;

pub use crate::catalog::{Catalog, Direction, ImportSummary};
pub use crate::core::{PlayerClient, PlayerCore};
pub use crate::error::{CatalogError, CoreError, StreamError};
pub use crate::protocol::{Command, Notice, NoticeLevel, PlayerEvent, PlayerSnapshot, Reply};
pub use crate::session::{
    HandleEvent, HandleEventKind, Phase, PlaybackSession, PlaybackState, StreamBackend,
    StreamHandle,
};
pub use crate::station::{NewStation, StationRecord};
