use serde::Deserialize;
use url::Url;

use crate::error::ConnectionError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9863;
pub const DEFAULT_NAMESPACE: &str = "/api/v1/realtime";

/// Settings supplied by the host application.
///
/// Only `api_key`, `previous_button_restarts_track` and the connection/timing
/// fields are read by this crate. `hover_controls` and `use_ytmd_uris` are
/// presentation flags carried through for the UI layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub api_key: String,
    pub hover_controls: bool,
    pub use_ytmd_uris: bool,
    pub previous_button_restarts_track: bool,

    pub host: String,
    pub port: u16,
    pub namespace: String,
    pub reconnect: ReconnectPolicy,

    pub seek_grace_ms: u64,
    pub idle_hide_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            hover_controls: false,
            use_ytmd_uris: false,
            previous_button_restarts_track: true,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            namespace: DEFAULT_NAMESPACE.to_string(),
            reconnect: ReconnectPolicy::default(),
            seek_grace_ms: 1000,
            idle_hide_ms: 5 * 60 * 1000,
            connect_timeout_ms: 20_000,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `YTMD_API_KEY`, `YTMD_HOST` and `YTMD_PORT`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(key) = std::env::var("YTMD_API_KEY") {
            settings.api_key = key;
        }
        if let Ok(host) = std::env::var("YTMD_HOST") {
            log::info!("Using manual YTMD address: {}", host);
            settings.host = host;
        }
        if let Ok(port) = std::env::var("YTMD_PORT") {
            match port.parse() {
                Ok(port) => settings.port = port,
                Err(e) => log::warn!("Ignoring invalid YTMD_PORT {:?}: {}", port, e),
            }
        }

        settings
    }

    /// Websocket URL of the player's Socket.IO endpoint.
    pub fn realtime_url(&self) -> Result<Url, ConnectionError> {
        let raw = format!(
            "ws://{}:{}/socket.io/?EIO=4&transport=websocket",
            self.host, self.port
        );
        Url::parse(&raw).map_err(|e| {
            ConnectionError::TransportFailure(format!("invalid endpoint {}: {}", raw, e))
        })
    }
}

/// How the transport behaves after losing the player.
///
/// The default matches socket.io-client: retry forever with a fixed delay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// `None` retries without limit
    pub max_attempts: Option<u32>,
    pub delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: None,
            delay_ms: 1000,
        }
    }
}

impl ReconnectPolicy {
    pub fn never() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `failed_attempts` consecutive failures.
    pub fn allows_retry(&self, failed_attempts: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| failed_attempts < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_player() {
        let settings = Settings::default();
        assert!(settings.previous_button_restarts_track);
        assert_eq!(
            settings.realtime_url().unwrap().as_str(),
            "ws://127.0.0.1:9863/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"apiKey": "abc", "reconnect": {"maxAttempts": 3}}"#,
        )
        .unwrap();
        assert_eq!(settings.api_key, "abc");
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.reconnect.max_attempts, Some(3));
        assert!(settings.reconnect.enabled);
    }

    #[test]
    fn bad_host_is_a_transport_failure() {
        let settings = Settings {
            host: "not a host".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.realtime_url(),
            Err(ConnectionError::TransportFailure(_))
        ));
    }

    #[test]
    fn retry_limits() {
        assert!(ReconnectPolicy::default().allows_retry(10_000));
        assert!(!ReconnectPolicy::never().allows_retry(0));

        let capped = ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        };
        assert!(capped.allows_retry(1));
        assert!(!capped.allows_retry(2));
    }
}
