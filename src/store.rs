use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::connection::{ConnectionManager, SessionEvent};
use crate::error::ConnectionError;
use crate::observer::{ObserverRegistry, SubscriberId};
use crate::reconciler::Reconciler;
use crate::timers::{TimerKey, Timers};
use crate::types::{ConnectionState, PlaybackModel};

/// The process-wide owner of the playback model.
///
/// Cloning is cheap and every clone refers to the same store. Inbound
/// snapshots and timer expiries are applied by a single event-loop task;
/// the only other writer is `seek`, which flags its optimistic position.
#[derive(Clone)]
pub struct PlayerStore {
    pub(crate) inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) settings: RwLock<Settings>,
    pub(crate) model: RwLock<PlaybackModel>,
    reconciler: Mutex<Reconciler>,
    pub(crate) connection: ConnectionManager,
    pub(crate) observers: ObserverRegistry,
    pub(crate) timers: Timers,
    /// Id of the event loop allowed to touch the model; bumped on teardown.
    session: Mutex<u64>,
    event_loop: Mutex<Option<EventLoop>>,
}

struct EventLoop {
    events: mpsc::UnboundedSender<SessionEvent>,
    handle: JoinHandle<()>,
}

impl PlayerStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                settings: RwLock::new(settings),
                model: RwLock::new(PlaybackModel::default()),
                reconciler: Mutex::new(Reconciler::new()),
                connection: ConnectionManager::new(),
                observers: ObserverRegistry::new(),
                timers: Timers::new(),
                session: Mutex::new(0),
                event_loop: Mutex::new(None),
            }),
        }
    }

    /// Connect with the configured API key unless a session already exists.
    pub fn initialize(&self) -> Result<(), ConnectionError> {
        if self.connection_state() != ConnectionState::Disconnected {
            return Ok(());
        }
        let api_key = self.inner.settings.read().api_key.clone();
        self.connect(&api_key)?;
        log::info!("Store initialized");
        Ok(())
    }

    /// Open a session with `credential`, replacing any existing one.
    /// On error nothing changes.
    pub fn connect(&self, credential: &str) -> Result<(), ConnectionError> {
        let settings = self.inner.settings.read().clone();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConnectionError::TransportFailure(format!("no async runtime: {}", e)))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.inner
            .connection
            .connect(&settings, credential, events_tx.clone())?;
        self.start_event_loop(&runtime, events_tx, events_rx);
        Ok(())
    }

    /// Close the session, cancel pending timers and reset the model to its
    /// connectionless defaults. Safe to call at any time, any number of times.
    pub fn disconnect(&self) {
        let had_session = self.inner.connection.disconnect();
        let changed = self.inner.end_session();
        if changed {
            self.inner.observers.notify();
        }
        if had_session {
            log::info!("Store disconnected");
        }
    }

    pub fn snapshot(&self) -> PlaybackModel {
        self.inner.model.read().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.watch()
    }

    /// A track is known and playback has not been idle past the hide window.
    pub fn should_display(&self) -> bool {
        let model = self.inner.model.read();
        model.track.is_some() && !model.idle_expired
    }

    pub fn settings(&self) -> Settings {
        self.inner.settings.read().clone()
    }

    /// Takes effect for command policy immediately and for the connection
    /// on the next `connect`.
    pub fn update_settings(&self, settings: Settings) {
        *self.inner.settings.write() = settings;
    }

    pub fn subscribe<F>(&self, id: SubscriberId, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(id, Arc::new(listener));
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    fn start_event_loop(
        &self,
        runtime: &tokio::runtime::Handle,
        events: mpsc::UnboundedSender<SessionEvent>,
        rx: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        // The previous session's state must be gone before this session's
        // first snapshot is reconciled.
        if self.inner.end_session() {
            self.inner.observers.notify();
        }

        let session = *self.inner.session.lock();
        let handle = runtime.spawn(run_events(Arc::downgrade(&self.inner), session, rx));
        *self.inner.event_loop.lock() = Some(EventLoop { events, handle });
    }

    #[cfg(test)]
    pub(crate) fn attach_loopback(
        &self,
    ) -> mpsc::UnboundedReceiver<crate::types::OutboundCommand> {
        let outbound = self.inner.connection.attach_loopback();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.start_event_loop(&tokio::runtime::Handle::current(), events_tx, events_rx);
        outbound
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, event: SessionEvent) {
        if let Some(event_loop) = self.inner.event_loop.lock().as_ref() {
            let _ = event_loop.events.send(event);
        }
    }
}

async fn run_events(
    store: Weak<StoreInner>,
    session: u64,
    mut rx: mpsc::UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = store.upgrade() else {
            break;
        };
        inner.process(session, event);
    }
    log::debug!("Event loop for session {} stopped", session);
}

impl StoreInner {
    fn process(&self, session: u64, event: SessionEvent) {
        let notify = {
            let current = self.session.lock();
            if *current != session {
                return;
            }
            self.handle_event(event)
        };

        if notify && *self.session.lock() == session {
            self.observers.notify();
        }
    }

    /// Apply one event. Returns whether observers should hear about it.
    fn handle_event(&self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Connected => false,
            SessionEvent::Disconnected(reason) => {
                log::info!("Dropping live state after disconnect ({})", reason);
                self.drop_live_state()
            }
            SessionEvent::ConnectionError(error) => {
                log::info!("Dropping live state after connection error ({})", error);
                self.drop_live_state()
            }
            SessionEvent::Snapshot(raw) => self.reconcile(&raw),
            SessionEvent::TimerElapsed(key, generation) => self.on_timer(key, generation),
        }
    }

    fn reconcile(&self, raw: &Value) -> bool {
        let (outcome, is_playing, idle_expired) = {
            let mut model = self.model.write();
            let outcome = match self.reconciler.lock().apply(&mut model, raw) {
                Ok(outcome) => outcome,
                Err(rejected) => {
                    log::warn!("Invalid state received: {}", rejected);
                    return false;
                }
            };
            if outcome.playing_changed && model.is_playing {
                model.idle_expired = false;
            }
            (outcome, model.is_playing, model.idle_expired)
        };

        if outcome.seek_converged || outcome.new_track {
            self.timers.cancel(TimerKey::SeekGrace);
        }

        if is_playing {
            self.timers.cancel(TimerKey::IdleHide);
        } else if outcome.playing_changed
            || (!idle_expired && !self.timers.is_pending(TimerKey::IdleHide))
        {
            let idle = Duration::from_millis(self.settings.read().idle_hide_ms);
            self.schedule(TimerKey::IdleHide, idle);
        }

        outcome.changed
    }

    fn on_timer(&self, key: TimerKey, generation: u64) -> bool {
        if !self.timers.is_current(key, generation) {
            log::debug!("Ignoring stale {:?} expiry", key);
            return false;
        }
        self.timers.complete(key, generation);

        let mut model = self.model.write();
        match key {
            TimerKey::SeekGrace if model.is_seek_pending => {
                model.is_seek_pending = false;
                model.seek_target_ms = None;
                true
            }
            TimerKey::IdleHide if !model.is_playing && !model.idle_expired => {
                log::info!("Playback idle, hiding player");
                model.idle_expired = true;
                true
            }
            _ => false,
        }
    }

    /// Schedule `key` to come back through the event queue after `delay`.
    pub(crate) fn schedule(&self, key: TimerKey, delay: Duration) {
        let events = match self.event_loop.lock().as_ref() {
            Some(event_loop) => event_loop.events.clone(),
            None => return,
        };
        self.timers.schedule(key, delay, move |generation| {
            let _ = events.send(SessionEvent::TimerElapsed(key, generation));
        });
    }

    /// Forget everything tied to the remote session. Returns whether the
    /// model changed.
    fn drop_live_state(&self) -> bool {
        self.timers.cancel_all();
        self.reconciler.lock().forget();
        let mut model = self.model.write();
        let before = model.clone();
        model.reset_connectionless();
        *model != before
    }

    /// Stop the current event loop and drop live state. Returns whether the
    /// model changed.
    fn end_session(&self) -> bool {
        let mut session = self.session.lock();
        *session += 1;
        if let Some(event_loop) = self.event_loop.lock().take() {
            event_loop.handle.abort();
        }
        self.drop_live_state()
    }
}
