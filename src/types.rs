use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Album name reported for every track; the player exposes no album field.
pub const ALBUM_NAME: &str = "YouTube Music";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Locally synthesized track identity. Not stable across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    /// Artwork URL, empty when the player sent no thumbnails
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub duration_ms: u64,
    pub album: Album,
    /// Never empty; the first entry is the primary artist
    pub artists: Vec<String>,
}

impl Track {
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or(UNKNOWN_ARTIST)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    /// The mode a repeat button press should request: `None -> One -> All -> None`.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::One,
            RepeatMode::One => RepeatMode::All,
            RepeatMode::All => RepeatMode::None,
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "NONE" => Some(RepeatMode::None),
            "ONE" => Some(RepeatMode::One),
            "ALL" => Some(RepeatMode::All),
            _ => None,
        }
    }
}

/// Live playback state mirrored from the player.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackModel {
    pub track: Option<Track>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub volume: u8,
    pub repeat_mode: RepeatMode,
    /// A locally initiated seek is in flight; inbound positions are held back.
    pub is_seek_pending: bool,
    pub seek_target_ms: Option<u64>,
    /// Playback has been stopped for longer than the idle window.
    pub idle_expired: bool,
}

impl PlaybackModel {
    /// Drop everything that would be stale across a session gap.
    ///
    /// Volume and repeat mode survive: they are player preferences rather
    /// than "now playing" data and the next snapshot overwrites them anyway.
    pub(crate) fn reset_connectionless(&mut self) {
        self.track = None;
        self.is_playing = false;
        self.position_ms = 0;
        self.duration_ms = 0;
        self.is_seek_pending = false;
        self.seek_target_ms = None;
        self.idle_expired = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Payload of the player's `state-update` event.
///
/// Both halves are optional so a malformed push can be rejected by the
/// reconciler instead of failing deserialization wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSnapshot {
    pub player: Option<RemotePlayer>,
    pub video: Option<RemoteVideo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlayer {
    pub track_state: Option<i64>,
    pub video_progress: Option<f64>,
    pub volume: Option<f64>,
    pub repeat_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVideo {
    pub title: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub thumbnails: Option<Vec<Thumbnail>>,
    pub duration_seconds: Option<f64>,
}

/// Only the URL is read; sizes arrive as integers or floats and are kept raw.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnail {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub width: Option<Value>,
    #[serde(default)]
    pub height: Option<Value>,
}

/// Outbound `player-command` payload: `{ "command": ..., "value"?: ... }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "value", rename_all = "lowercase")]
pub enum OutboundCommand {
    Play,
    Pause,
    Next,
    Previous,
    Seek(u64),
    Volume(u8),
    Repeat(RepeatMode),
    Shuffle(bool),
}

impl OutboundCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundCommand::Play => "play",
            OutboundCommand::Pause => "pause",
            OutboundCommand::Next => "next",
            OutboundCommand::Previous => "previous",
            OutboundCommand::Seek(_) => "seek",
            OutboundCommand::Volume(_) => "volume",
            OutboundCommand::Repeat(_) => "repeat",
            OutboundCommand::Shuffle(_) => "shuffle",
        }
    }
}
