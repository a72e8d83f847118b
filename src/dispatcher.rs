//! Player controls.
//!
//! Every command is a logged no-op while the player is not connected. Seek
//! input is expected to be debounced by the caller (see `debounce`); nothing
//! here coalesces repeated commands.

use std::time::Duration;

use crate::store::PlayerStore;
use crate::timers::TimerKey;
use crate::types::{OutboundCommand, RepeatMode};

/// Past this position "previous" restarts the current track instead.
pub const RESTART_THRESHOLD_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousAction {
    RestartTrack,
    PreviousTrack,
}

/// Decide what the previous button does.
pub fn resolve_previous(restart_enabled: bool, position_ms: u64) -> PreviousAction {
    if restart_enabled && position_ms > RESTART_THRESHOLD_MS {
        PreviousAction::RestartTrack
    } else {
        PreviousAction::PreviousTrack
    }
}

impl PlayerStore {
    pub fn play(&self) -> bool {
        self.dispatch(OutboundCommand::Play)
    }

    pub fn pause(&self) -> bool {
        self.dispatch(OutboundCommand::Pause)
    }

    pub fn set_playing(&self, playing: bool) -> bool {
        if playing {
            self.play()
        } else {
            self.pause()
        }
    }

    pub fn next(&self) -> bool {
        self.dispatch(OutboundCommand::Next)
    }

    /// Restart or go back, per `resolve_previous` and the
    /// `previous_button_restarts_track` setting.
    pub fn previous(&self) -> PreviousAction {
        let restart_enabled = self.inner.settings.read().previous_button_restarts_track;
        let position = self.inner.model.read().position_ms;

        let action = resolve_previous(restart_enabled, position);
        match action {
            PreviousAction::RestartTrack => {
                self.seek(0);
            }
            PreviousAction::PreviousTrack => {
                self.dispatch(OutboundCommand::Previous);
            }
        }
        action
    }

    /// Jump to `position_ms`, holding that position locally until the player
    /// reports it or the grace window ends.
    pub fn seek(&self, position_ms: u64) -> bool {
        if !self.inner.connection.is_connected() {
            log::debug!("Ignoring seek to {} ms: not connected", position_ms);
            return false;
        }

        {
            let mut model = self.inner.model.write();
            model.is_seek_pending = true;
            model.seek_target_ms = Some(position_ms);
            model.position_ms = position_ms;
        }

        let sent = self.dispatch(OutboundCommand::Seek(position_ms));
        let grace = Duration::from_millis(self.inner.settings.read().seek_grace_ms);
        self.inner.schedule(TimerKey::SeekGrace, grace);
        self.inner.observers.notify();
        sent
    }

    pub fn set_volume(&self, volume: u8) -> bool {
        self.dispatch(OutboundCommand::Volume(volume.min(100)))
    }

    pub fn set_repeat(&self, mode: RepeatMode) -> bool {
        self.dispatch(OutboundCommand::Repeat(mode))
    }

    pub fn set_shuffle(&self, enabled: bool) -> bool {
        self.dispatch(OutboundCommand::Shuffle(enabled))
    }

    fn dispatch(&self, command: OutboundCommand) -> bool {
        self.inner.connection.send(command)
    }
}
