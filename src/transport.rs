//! The background task that speaks Socket.IO to the player.
//!
//! One task per `connect`. It owns the websocket, reconnects according to
//! the configured policy and turns everything it hears into `SessionEvent`s.

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use url::Url;

use crate::config::ReconnectPolicy;
use crate::connection::{SessionEvent, StatePublisher};
use crate::error::{PacketError, TransportError};
use crate::socketio::Packet;
use crate::types::{ConnectionState, OutboundCommand};

pub const STATE_EVENT: &str = "state-update";
pub const COMMAND_EVENT: &str = "player-command";

pub(crate) struct TransportConfig {
    pub url: Url,
    pub namespace: String,
    pub credential: String,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

/// Why a session ended without a transport error.
enum SessionEnd {
    Closed(String),
    /// The manager dropped the session; stop without reconnecting.
    ClientGone,
}

/// Run sessions until the manager goes away or the reconnect policy gives up.
pub(crate) async fn run(
    config: TransportConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut outbound: mpsc::UnboundedReceiver<OutboundCommand>,
    publisher: StatePublisher,
) {
    let mut attempts: u32 = 0;

    loop {
        if !publisher.is_current() {
            break;
        }
        publisher.publish(ConnectionState::Connecting);
        log::info!("Connecting to YTMD at {}", config.url);

        let mut session = SessionContext {
            config: &config,
            events: &events,
            publisher: &publisher,
            heartbeat: config.connect_timeout,
            connected: false,
        };
        let result = session.run(&mut outbound).await;
        if session.connected {
            attempts = 0;
        }

        let event = match result {
            Ok(SessionEnd::ClientGone) => break,
            Ok(SessionEnd::Closed(reason)) => {
                log::warn!("WebSocket disconnected: {}", reason);
                SessionEvent::Disconnected(reason)
            }
            Err(e) => {
                log::error!("Connection error: {}", e);
                SessionEvent::ConnectionError(e.to_string())
            }
        };

        let retry = config.reconnect.allows_retry(attempts);
        // State first, so commands stop being accepted before the store
        // sees the event.
        publisher.publish(if retry {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        });
        if events.send(event).is_err() || !retry {
            break;
        }

        attempts += 1;
        log::info!(
            "Reconnecting in {} ms (attempt {})",
            config.reconnect.delay_ms,
            attempts
        );
        tokio::time::sleep(Duration::from_millis(config.reconnect.delay_ms)).await;
    }

    log::info!("Transport task stopped");
}

struct SessionContext<'a> {
    config: &'a TransportConfig,
    events: &'a mpsc::UnboundedSender<SessionEvent>,
    publisher: &'a StatePublisher,
    /// Longest silence tolerated from the player
    heartbeat: Duration,
    connected: bool,
}

impl SessionContext<'_> {
    async fn run(
        &mut self,
        outbound: &mut mpsc::UnboundedReceiver<OutboundCommand>,
    ) -> Result<SessionEnd, TransportError> {
        let timeout_ms = self.config.connect_timeout.as_millis() as u64;
        let (ws, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            connect_async(self.config.url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout(timeout_ms))??;

        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                frame = tokio::time::timeout(self.heartbeat, stream.next()) => {
                    let message = match frame {
                        Err(_) if self.connected => return Ok(SessionEnd::Closed("ping timeout".into())),
                        Err(_) => return Err(TransportError::Timeout(self.heartbeat.as_millis() as u64)),
                        Ok(None) => return Ok(SessionEnd::Closed("transport close".into())),
                        Ok(Some(Err(e))) => return Err(e.into()),
                        Ok(Some(Ok(message))) => message,
                    };
                    if let Some(end) = self.on_message(&mut sink, message).await? {
                        return Ok(end);
                    }
                }
                command = outbound.recv(), if self.connected => {
                    match command {
                        Some(command) => self.send_command(&mut sink, command).await?,
                        None => {
                            let goodbye = Packet::Disconnect { namespace: self.config.namespace.clone() };
                            let _ = send_packet(&mut sink, &goodbye).await;
                            let _ = sink.close().await;
                            return Ok(SessionEnd::ClientGone);
                        }
                    }
                }
            }
        }
    }

    async fn on_message<S>(
        &mut self,
        sink: &mut S,
        message: Message,
    ) -> Result<Option<SessionEnd>, TransportError>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(Some(SessionEnd::Closed("transport close".into()))),
            // Websocket-level pings are answered by tungstenite itself.
            _ => return Ok(None),
        };

        let packet = match Packet::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!("Ignoring undecodable frame {:?}: {}", text, e);
                return Ok(None);
            }
        };

        match packet {
            Packet::Open(handshake) => {
                log::debug!("Engine.IO open, sid {}", handshake.sid);
                self.heartbeat = Duration::from_millis(handshake.heartbeat_ms());
                let connect = Packet::Connect {
                    namespace: self.config.namespace.clone(),
                    data: Some(json!({ "token": self.config.credential })),
                };
                send_packet(sink, &connect).await?;
            }
            Packet::Ping => send_packet(sink, &Packet::Pong).await?,
            Packet::Close => return Ok(Some(SessionEnd::Closed("transport close".into()))),
            Packet::Connect { namespace, .. } if namespace == self.config.namespace => {
                self.connected = true;
                self.publisher.publish(ConnectionState::Connected);
                log::info!("WebSocket connected successfully");
                if self.events.send(SessionEvent::Connected).is_err() {
                    return Ok(Some(SessionEnd::ClientGone));
                }
            }
            Packet::ConnectError { data, .. } => {
                return Err(TransportError::Rejected(rejection_reason(data)));
            }
            Packet::Disconnect { namespace } if namespace == self.config.namespace => {
                return Ok(Some(SessionEnd::Closed("io server disconnect".into())));
            }
            Packet::Event {
                namespace,
                name,
                mut args,
            } if namespace == self.config.namespace && name == STATE_EVENT => {
                if args.is_empty() {
                    log::warn!("Ignoring {} without payload", STATE_EVENT);
                    return Ok(None);
                }
                if self.events.send(SessionEvent::Snapshot(args.swap_remove(0))).is_err() {
                    return Ok(Some(SessionEnd::ClientGone));
                }
            }
            other => log::debug!("Ignoring packet {:?}", other),
        }

        Ok(None)
    }

    async fn send_command<S>(&self, sink: &mut S, command: OutboundCommand) -> Result<(), TransportError>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let payload = serde_json::to_value(&command)
            .map_err(|e| PacketError::InvalidPayload(e.to_string()))?;
        log::debug!("Sending {} command", command.name());
        send_packet(sink, &Packet::event(&self.config.namespace, COMMAND_EVENT, payload)).await
    }
}

async fn send_packet<S>(sink: &mut S, packet: &Packet) -> Result<(), TransportError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(packet.encode())).await?;
    Ok(())
}

fn rejection_reason(data: Option<Value>) -> String {
    match data {
        Some(value) => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        None => "unauthorized".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_reason_prefers_message() {
        assert_eq!(
            rejection_reason(Some(json!({"message": "Unauthorized"}))),
            "Unauthorized"
        );
        assert_eq!(rejection_reason(Some(json!({"code": 4}))), r#"{"code":4}"#);
        assert_eq!(rejection_reason(None), "unauthorized");
    }
}
