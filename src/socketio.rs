//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Every websocket text frame carries one Engine.IO packet: a single type
//! digit followed by its payload. Type `4` (message) wraps a Socket.IO packet:
//!
//! `<type>[<namespace>,][<ack id>][<json>]`
//!
//! The namespace is omitted for the root namespace `/`. Binary attachments
//! are not used by the player and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PacketError;

/// Payload of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// Longest silence tolerated before the session is considered dead.
    pub fn heartbeat_ms(&self) -> u64 {
        self.ping_interval.saturating_add(self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl Packet {
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        Packet::Event {
            namespace: namespace.to_string(),
            name: name.to_string(),
            args: vec![payload],
        }
    }

    /// Encode into the text of a single websocket frame.
    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!("0{}", json_text(handshake)),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { namespace, data } => format!(
                "40{}{}",
                namespace_prefix(namespace),
                data.as_ref().map(json_text).unwrap_or_default()
            ),
            Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
            Packet::Event {
                namespace,
                name,
                args,
            } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                format!("42{}{}", namespace_prefix(namespace), Value::Array(array))
            }
            Packet::Ack {
                namespace,
                id,
                args,
            } => format!(
                "43{}{}{}",
                namespace_prefix(namespace),
                id,
                Value::Array(args.clone())
            ),
            Packet::ConnectError { namespace, data } => format!(
                "44{}{}",
                namespace_prefix(namespace),
                data.as_ref().map(json_text).unwrap_or_default()
            ),
        }
    }

    /// Decode the text of a single websocket frame.
    pub fn decode(text: &str) -> Result<Self, PacketError> {
        let mut chars = text.chars();
        let engine_type = chars.next().ok_or(PacketError::Empty)?;
        let rest = chars.as_str();

        match engine_type {
            '0' => serde_json::from_str(rest)
                .map(Packet::Open)
                .map_err(|e| PacketError::InvalidPayload(e.to_string())),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Packet::Noop),
            other => Err(PacketError::UnknownEngineType(other)),
        }
    }
}

fn decode_socket_packet(text: &str) -> Result<Packet, PacketError> {
    let mut chars = text.chars();
    let socket_type = chars.next().ok_or(PacketError::Empty)?;
    let mut rest = chars.as_str();

    let namespace = if rest.starts_with('/') {
        let (namespace, tail) = match rest.find(',') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        rest = tail;
        namespace.to_string()
    } else {
        "/".to_string()
    };

    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        let id = rest[..digits]
            .parse::<u64>()
            .map_err(|e| PacketError::InvalidPayload(e.to_string()))?;
        rest = &rest[digits..];
        Some(id)
    } else {
        None
    };

    let data = if rest.is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(rest)
                .map_err(|e| PacketError::InvalidPayload(e.to_string()))?,
        )
    };

    match socket_type {
        '0' => Ok(Packet::Connect { namespace, data }),
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let mut args = match data {
                Some(Value::Array(args)) => args,
                _ => return Err(PacketError::InvalidPayload("event without argument array".into())),
            };
            if args.is_empty() {
                return Err(PacketError::InvalidPayload("event without name".into()));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(PacketError::InvalidPayload(format!(
                        "event name is not a string: {}",
                        other
                    )))
                }
            };
            Ok(Packet::Event {
                namespace,
                name,
                args,
            })
        }
        '3' => {
            let id = ack_id.ok_or_else(|| PacketError::InvalidPayload("ack without id".into()))?;
            let args = match data {
                Some(Value::Array(args)) => args,
                None => Vec::new(),
                Some(other) => vec![other],
            };
            Ok(Packet::Ack {
                namespace,
                id,
                args,
            })
        }
        '4' => Ok(Packet::ConnectError { namespace, data }),
        other => Err(PacketError::UnknownSocketType(other)),
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == "/" || namespace.is_empty() {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

fn json_text<T: Serialize>(value: &T) -> String {
    // Handshake and Value never fail to serialize.
    serde_json::to_string(value).unwrap_or_default()
}
