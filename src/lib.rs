//! Mirrors the playback state of a running YouTube Music Desktop app and
//! sends player controls back to it over the app's Socket.IO realtime API.
//!
//! [`PlayerStore`] is the entry point: it owns the connection, the playback
//! model and the subscriber list. Presentation code reads
//! [`PlayerStore::snapshot`], subscribes for change notifications and calls
//! the control methods.

pub mod config;
mod connection;
pub mod debounce;
mod dispatcher;
pub mod error;
pub mod format;
pub mod observer;
mod reconciler;
pub mod socketio;
mod store;
mod timers;
mod transport;
pub mod types;

use std::sync::OnceLock;

pub use config::{ReconnectPolicy, Settings};
pub use debounce::Debouncer;
pub use dispatcher::{resolve_previous, PreviousAction, RESTART_THRESHOLD_MS};
pub use error::{ConnectionError, SnapshotRejected};
pub use observer::SubscriberId;
pub use reconciler::SEEK_CONVERGENCE_MS;
pub use store::PlayerStore;
pub use transport::{COMMAND_EVENT, STATE_EVENT};
pub use types::{ConnectionState, OutboundCommand, PlaybackModel, RepeatMode, Track, TrackId};

static STORE: OnceLock<PlayerStore> = OnceLock::new();

/// Install the process-wide store. Later calls return the existing one and
/// ignore `settings`.
pub fn init_store(settings: Settings) -> &'static PlayerStore {
    STORE.get_or_init(|| PlayerStore::new(settings))
}

pub fn store() -> Option<&'static PlayerStore> {
    STORE.get()
}
