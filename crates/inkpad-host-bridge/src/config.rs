//! Bridge configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `host:port` the host listens on.
    pub endpoint: String,
    /// How long to wait for the host's capability set after saying hello.
    pub handshake_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7878".to_string(),
            handshake_timeout_ms: 5_000,
        }
    }
}

impl BridgeConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// - `INKPAD_HOST_ENDPOINT`
    /// - `INKPAD_HANDSHAKE_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("INKPAD_HOST_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(raw) = std::env::var("INKPAD_HANDSHAKE_TIMEOUT_MS") {
            match raw.trim().parse() {
                Ok(ms) => config.handshake_timeout_ms = ms,
                Err(_) => tracing::warn!(value = %raw, "ignoring unparseable handshake timeout"),
            }
        }
        config
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: BridgeConfig = serde_json::from_str(r#"{"endpoint":"10.0.0.2:9000"}"#).unwrap();
        assert_eq!(config.endpoint, "10.0.0.2:9000");
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
    }
}
