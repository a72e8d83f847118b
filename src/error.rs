use thiserror::Error;

/// Returned by `connect`. Fatal to that attempt only; callers may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("transport could not be created: {0}")]
    TransportFailure(String),
}

/// A `state-update` payload that could not be applied. Logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("snapshot rejected: {reason}")]
pub struct SnapshotRejected {
    pub reason: String,
}

impl SnapshotRejected {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Failures inside a running transport session. These never reach callers
/// directly; they become `ConnectionError` lifecycle events.
#[derive(Error, Debug)]
pub(crate) enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] PacketError),
    #[error("connection refused by player: {0}")]
    Rejected(String),
    #[error("no response from player within {0} ms")]
    Timeout(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown engine.io packet type {0:?}")]
    UnknownEngineType(char),
    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketType(char),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}
