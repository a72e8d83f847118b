#![allow(dead_code)]
//! An in-process stand-in for the YTMD realtime endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use ytmd_sync::config::DEFAULT_NAMESPACE;
use ytmd_sync::socketio::{Handshake, Packet};
use ytmd_sync::{ReconnectPolicy, Settings, COMMAND_EVENT, STATE_EVENT};

enum Control {
    Push(Value),
    Kick,
    Ping,
    /// Stop sending anything, pings included, on the current connection.
    GoSilent,
}

pub struct FakePlayer {
    pub addr: SocketAddr,
    control: mpsc::UnboundedSender<Control>,
    commands: mpsc::UnboundedReceiver<Value>,
    /// Sessions that passed authentication
    accepted: Arc<AtomicUsize>,
    rejected: Arc<AtomicUsize>,
    goodbyes: Arc<AtomicUsize>,
    pongs: Arc<AtomicUsize>,
}

impl FakePlayer {
    pub async fn start(token: &str) -> Self {
        Self::start_with_heartbeat(token, 25_000, 20_000).await
    }

    /// Advertise `ping_interval` / `ping_timeout` in the handshake and ping
    /// every `ping_interval` while connected.
    pub async fn start_with_heartbeat(token: &str, ping_interval: u64, ping_timeout: u64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (control, control_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));
        let goodbyes = Arc::new(AtomicUsize::new(0));
        let pongs = Arc::new(AtomicUsize::new(0));

        tokio::spawn(serve(
            listener,
            token.to_string(),
            (ping_interval, ping_timeout),
            control_rx,
            commands_tx,
            Counters {
                accepted: accepted.clone(),
                rejected: rejected.clone(),
                goodbyes: goodbyes.clone(),
                pongs: pongs.clone(),
            },
        ));

        Self {
            addr,
            control,
            commands,
            accepted,
            rejected,
            goodbyes,
            pongs,
        }
    }

    /// Settings pointing at this server with a fast reconnect.
    pub fn settings(&self, api_key: &str) -> Settings {
        Settings {
            api_key: api_key.to_string(),
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            reconnect: ReconnectPolicy {
                enabled: true,
                max_attempts: None,
                delay_ms: 50,
            },
            connect_timeout_ms: 2000,
            ..Settings::default()
        }
    }

    pub fn push_state(&self, state: Value) {
        self.control.send(Control::Push(state)).unwrap();
    }

    /// Server-side namespace disconnect of the current client.
    pub fn kick(&self) {
        self.control.send(Control::Kick).unwrap();
    }

    /// Send an Engine.IO ping to the current client.
    pub fn ping(&self) {
        self.control.send(Control::Ping).unwrap();
    }

    pub fn go_silent(&self) {
        self.control.send(Control::GoSilent).unwrap();
    }

    pub async fn next_command(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.commands.recv())
            .await
            .expect("timed out waiting for a player command")
            .expect("server stopped")
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn goodbyes(&self) -> usize {
        self.goodbyes.load(Ordering::SeqCst)
    }

    pub fn pongs(&self) -> usize {
        self.pongs.load(Ordering::SeqCst)
    }
}

struct Counters {
    accepted: Arc<AtomicUsize>,
    rejected: Arc<AtomicUsize>,
    goodbyes: Arc<AtomicUsize>,
    pongs: Arc<AtomicUsize>,
}

async fn serve(
    listener: TcpListener,
    token: String,
    (ping_interval, ping_timeout): (u64, u64),
    mut control: mpsc::UnboundedReceiver<Control>,
    commands: mpsc::UnboundedSender<Value>,
    counters: Counters,
) {
    while let Ok((stream, _)) = listener.accept().await {
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            continue;
        };
        let (mut sink, mut source) = ws.split();

        let open = Packet::Open(Handshake {
            sid: "engine-sid".to_string(),
            upgrades: vec![],
            ping_interval,
            ping_timeout,
            max_payload: Some(1_000_000),
        });
        if sink.send(Message::Text(open.encode())).await.is_err() {
            continue;
        }

        // Authentication
        let authorized = match source.next().await {
            Some(Ok(Message::Text(text))) => match Packet::decode(&text) {
                Ok(Packet::Connect { namespace, data }) => {
                    namespace == DEFAULT_NAMESPACE
                        && data.as_ref().and_then(|d| d.get("token")).and_then(Value::as_str)
                            == Some(token.as_str())
                }
                _ => false,
            },
            _ => false,
        };

        if !authorized {
            counters.rejected.fetch_add(1, Ordering::SeqCst);
            let refusal = Packet::ConnectError {
                namespace: DEFAULT_NAMESPACE.to_string(),
                data: Some(json!({"message": "Unauthorized"})),
            };
            let _ = sink.send(Message::Text(refusal.encode())).await;
            let _ = sink.close().await;
            continue;
        }

        let ack = Packet::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: Some(json!({"sid": "socket-sid"})),
        };
        if sink.send(Message::Text(ack.encode())).await.is_err() {
            continue;
        }
        counters.accepted.fetch_add(1, Ordering::SeqCst);

        let period = Duration::from_millis(ping_interval);
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut silent = false;

        loop {
            tokio::select! {
                _ = heartbeat.tick(), if !silent => {
                    if sink.send(Message::Text(Packet::Ping.encode())).await.is_err() {
                        break;
                    }
                }
                request = control.recv() => match request {
                    Some(Control::Push(_)) | Some(Control::Ping) if silent => {}
                    Some(Control::Ping) => {
                        if sink.send(Message::Text(Packet::Ping.encode())).await.is_err() {
                            break;
                        }
                    }
                    Some(Control::GoSilent) => silent = true,
                    Some(Control::Push(state)) => {
                        let event = Packet::event(DEFAULT_NAMESPACE, STATE_EVENT, state);
                        if sink.send(Message::Text(event.encode())).await.is_err() {
                            break;
                        }
                    }
                    Some(Control::Kick) => {
                        let bye = Packet::Disconnect { namespace: DEFAULT_NAMESPACE.to_string() };
                        let _ = sink.send(Message::Text(bye.encode())).await;
                        let _ = sink.close().await;
                        break;
                    }
                    None => return,
                },
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => match Packet::decode(&text) {
                        Ok(Packet::Event { name, mut args, .. }) if name == COMMAND_EVENT && !args.is_empty() => {
                            let _ = commands.send(args.swap_remove(0));
                        }
                        Ok(Packet::Pong) => {
                            counters.pongs.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(Packet::Disconnect { .. }) => {
                            counters.goodbyes.fetch_add(1, Ordering::SeqCst);
                            break;
                        }
                        _ => {}
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

/// Poll `condition` every 10 ms until it holds, panicking after `timeout`.
pub async fn wait_until<F>(what: &str, timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn state_update(track_state: i64, title: &str, progress: u64) -> Value {
    json!({
        "player": {"trackState": track_state, "videoProgress": progress, "volume": 80, "repeatMode": "NONE"},
        "video": {
            "title": title,
            "author": "Artist A",
            "thumbnails": [{"url": "u", "width": 1, "height": 1}],
            "durationSeconds": 200000
        }
    })
}
