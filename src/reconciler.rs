//! Maps `state-update` payloads onto the playback model.

use serde_json::Value;

use crate::error::SnapshotRejected;
use crate::types::{
    Album, PlaybackModel, RemotePlayer, RemoteSnapshot, RemoteVideo, RepeatMode, Track, TrackId,
    ALBUM_NAME, UNKNOWN_ARTIST, UNKNOWN_TITLE,
};

/// An inbound position this close to the seek target counts as the player
/// having caught up.
pub const SEEK_CONVERGENCE_MS: u64 = 1000;

/// Player `trackState` meaning nothing is playing.
const TRACK_STATE_STOPPED: i64 = 0;

/// What a reconciled snapshot did to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub changed: bool,
    pub playing_changed: bool,
    pub new_track: bool,
    pub seek_converged: bool,
}

/// Carries the state needed across snapshots: the last title seen and the
/// id counter used to synthesize track identities.
#[derive(Debug, Default)]
pub struct Reconciler {
    previous_title: Option<String>,
    next_id: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last title so the next active snapshot starts a new track.
    pub fn forget(&mut self) {
        self.previous_title = None;
    }

    /// Apply one raw snapshot. On rejection the model is untouched.
    pub fn apply(
        &mut self,
        model: &mut PlaybackModel,
        raw: &Value,
    ) -> Result<Reconciled, SnapshotRejected> {
        let snapshot: RemoteSnapshot = serde_json::from_value(raw.clone())
            .map_err(|e| SnapshotRejected::new(format!("undecodable payload: {}", e)))?;

        let (player, video) = match (snapshot.player, snapshot.video) {
            (Some(player), Some(video)) => (player, video),
            (None, _) => return Err(SnapshotRejected::new("missing player record")),
            (_, None) => return Err(SnapshotRejected::new("missing video record")),
        };

        // Build the next state on a copy so observers never see half of it.
        let mut next = model.clone();
        let mut outcome = Reconciled::default();

        if player.track_state == Some(TRACK_STATE_STOPPED) {
            next.is_playing = false;
        } else {
            outcome.new_track = self.apply_track(&mut next, &video);
            if outcome.new_track && next.is_seek_pending {
                // The target belonged to the previous song.
                log::debug!("Track changed, dropping pending seek");
                next.is_seek_pending = false;
                next.seek_target_ms = None;
            }
            outcome.seek_converged = apply_player(&mut next, &player, &video);
        }

        outcome.playing_changed = next.is_playing != model.is_playing;
        outcome.changed = next != *model;
        *model = next;

        Ok(outcome)
    }

    /// Rebuild the track from the video record. Returns whether it is a new song.
    fn apply_track(&mut self, next: &mut PlaybackModel, video: &RemoteVideo) -> bool {
        let name = non_empty(video.title.as_deref()).unwrap_or(UNKNOWN_TITLE).to_string();
        let artist = non_empty(video.author.as_deref()).unwrap_or(UNKNOWN_ARTIST).to_string();
        let image = video
            .thumbnails
            .as_ref()
            .and_then(|thumbs| thumbs.first())
            .and_then(|thumb| thumb.url.clone())
            .unwrap_or_default();
        let duration_ms = millis(video.duration_seconds);

        let current_id = next.track.as_ref().map(|track| track.id);
        let is_new = current_id.is_none() || self.previous_title.as_deref() != Some(name.as_str());

        let id = match current_id {
            Some(id) if !is_new => id,
            _ => {
                self.next_id += 1;
                log::info!("Now playing: {} by {} ({} ms)", name, artist, duration_ms);
                TrackId(self.next_id)
            }
        };
        self.previous_title = Some(name.clone());

        next.track = Some(Track {
            id,
            name,
            duration_ms,
            album: Album {
                name: ALBUM_NAME.to_string(),
                image,
            },
            artists: vec![artist],
        });

        is_new
    }
}

/// Playback fields of an active snapshot. Returns whether a pending seek converged.
fn apply_player(next: &mut PlaybackModel, player: &RemotePlayer, video: &RemoteVideo) -> bool {
    let mut converged = false;
    let position = millis(player.video_progress);

    next.is_playing = true;
    next.duration_ms = millis(video.duration_seconds);

    if next.is_seek_pending {
        let target = next.seek_target_ms.unwrap_or(next.position_ms);
        if position.abs_diff(target) <= SEEK_CONVERGENCE_MS {
            next.position_ms = position;
            next.is_seek_pending = false;
            next.seek_target_ms = None;
            converged = true;
        } else {
            log::debug!("Holding position at {} ms while seek is pending (player at {} ms)", target, position);
        }
    } else {
        next.position_ms = position;
    }

    if let Some(volume) = player.volume {
        next.volume = volume.clamp(0.0, 100.0) as u8;
    }

    if let Some(raw) = player.repeat_mode.as_deref() {
        match RepeatMode::from_wire(raw) {
            Some(mode) => next.repeat_mode = mode,
            None => log::warn!("Ignoring unknown repeat mode {:?}", raw),
        }
    }

    converged
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Numeric wire field to a non-negative integer; absent or garbage becomes 0.
fn millis(value: Option<f64>) -> u64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v as u64,
        _ => 0,
    }
}
