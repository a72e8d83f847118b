use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::ConnectionError;
use crate::timers::TimerKey;
use crate::transport::{self, TransportConfig};
use crate::types::{ConnectionState, OutboundCommand};

/// How long a closing transport gets to say goodbye before it is aborted.
const GRACEFUL_CLOSE: Duration = Duration::from_millis(500);

/// Everything the store's event loop consumes, in arrival order.
#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    Connected,
    Disconnected(String),
    ConnectionError(String),
    Snapshot(Value),
    TimerElapsed(TimerKey, u64),
}

struct Shared {
    /// Id of the session allowed to publish state; bumped on every teardown.
    active: Mutex<u64>,
    state: watch::Sender<ConnectionState>,
}

/// Publishes connection state for one session and goes quiet once that
/// session has been superseded or torn down.
#[derive(Clone)]
pub(crate) struct StatePublisher {
    shared: Arc<Shared>,
    session: u64,
}

impl StatePublisher {
    pub fn publish(&self, state: ConnectionState) -> bool {
        let active = self.shared.active.lock();
        if *active != self.session {
            return false;
        }
        self.shared.state.send_replace(state);
        true
    }

    pub fn is_current(&self) -> bool {
        *self.shared.active.lock() == self.session
    }
}

struct Session {
    outbound: mpsc::UnboundedSender<OutboundCommand>,
    transport: Option<JoinHandle<()>>,
}

/// Owns the single transport session to the player.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                active: Mutex::new(0),
                state,
            }),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Start a session in the background. No network I/O happens here; the
    /// outcome of the handshake arrives on `events`.
    pub(crate) fn connect(
        &self,
        settings: &Settings,
        credential: &str,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<(), ConnectionError> {
        let credential = credential.trim();
        if credential.is_empty() {
            log::error!("Cannot connect: no API key set");
            return Err(ConnectionError::MissingCredential);
        }

        let url = settings.realtime_url()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConnectionError::TransportFailure(format!("no async runtime: {}", e)))?;

        self.disconnect();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let publisher = self.begin_session();

        let config = TransportConfig {
            url,
            namespace: settings.namespace.clone(),
            credential: credential.to_string(),
            reconnect: settings.reconnect.clone(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
        };
        let handle = runtime.spawn(transport::run(config, events, outbound_rx, publisher));

        *self.session.lock() = Some(Session {
            outbound: outbound_tx,
            transport: Some(handle),
        });

        log::info!("Socket connection initialized");
        Ok(())
    }

    /// Fire-and-forget. Dropped with a debug line unless connected.
    pub fn send(&self, command: OutboundCommand) -> bool {
        if !self.is_connected() {
            log::debug!("Dropping {} command: not connected", command.name());
            return false;
        }

        match self.session.lock().as_ref() {
            Some(session) => {
                let name = command.name();
                if session.outbound.send(command).is_err() {
                    log::debug!("Dropping {} command: transport stopped", name);
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Tear down the session, if any. Safe to call repeatedly.
    /// Returns whether a session existed.
    pub fn disconnect(&self) -> bool {
        let session = self.session.lock().take();

        {
            let mut active = self.shared.active.lock();
            *active += 1;
            self.shared.state.send_replace(ConnectionState::Disconnected);
        }

        let Some(session) = session else {
            return false;
        };

        // Closing the command channel asks the transport to send a namespace
        // disconnect and close the socket; abort it if it takes too long.
        drop(session.outbound);
        if let Some(mut handle) = session.transport {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if tokio::time::timeout(GRACEFUL_CLOSE, &mut handle).await.is_err() {
                            log::warn!("Transport didn't stop after {:?}, aborting", GRACEFUL_CLOSE);
                            handle.abort();
                        }
                    });
                }
                Err(_) => handle.abort(),
            }
        }

        log::info!("Connection closed");
        true
    }

    fn begin_session(&self) -> StatePublisher {
        let mut active = self.shared.active.lock();
        *active += 1;
        self.shared.state.send_replace(ConnectionState::Connecting);
        StatePublisher {
            shared: self.shared.clone(),
            session: *active,
        }
    }

    /// Install a connected session whose commands land on the returned
    /// receiver instead of a socket.
    #[cfg(test)]
    pub(crate) fn attach_loopback(&self) -> mpsc::UnboundedReceiver<OutboundCommand> {
        self.disconnect();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.begin_session().publish(ConnectionState::Connected);
        *self.session.lock() = Some(Session {
            outbound: outbound_tx,
            transport: None,
        });
        outbound_rx
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            if let Some(handle) = session.transport {
                handle.abort();
            }
        }
    }
}
