use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_HOST: &str = "localhost:8080";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `host:port` of the relay; `CHAT_SERVER_HOST` overrides it.
    pub server_host: String,
    /// Key directory; defaults to `<home>/.chatkeys`.
    pub key_dir: Option<PathBuf>,
    /// How long a received message is considered unread before the client
    /// sends the `read` receipt.
    pub read_receipt_dwell_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            key_dir: None,
            read_receipt_dwell_ms: 1000,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("CHAT_SERVER_HOST") {
            if !host.is_empty() {
                config.server_host = host;
            }
        }
        if let Ok(dir) = std::env::var("COURIER_KEY_DIR") {
            config.key_dir = Some(PathBuf::from(dir));
        }
        if let Ok(ms) = std::env::var("COURIER_READ_DWELL_MS") {
            if let Ok(ms) = ms.parse() {
                config.read_receipt_dwell_ms = ms;
            }
        }
        config
    }

    pub fn register_url(&self) -> String {
        format!("http://{}/register", self.server_host)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/message", self.server_host)
    }

    pub fn read_receipt_dwell(&self) -> Duration {
        Duration::from_millis(self.read_receipt_dwell_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_use_configured_host() {
        let config = ClientConfig {
            server_host: "relay.example.com:9000".to_string(),
            ..Default::default()
        };
        assert_eq!(config.register_url(), "http://relay.example.com:9000/register");
        assert_eq!(config.ws_url(), "ws://relay.example.com:9000/message");
    }
}
