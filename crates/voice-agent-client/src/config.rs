//! Configuration types for the voice agent client

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Path of the offer endpoint relative to the server base URL
pub const OFFER_PATH: &str = "/webrtc/offer";

/// Main configuration for a [`SessionController`](crate::SessionController)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Voice agent server base URL (http:// or https://)
    pub server_url: String,

    /// STUN server URLs (empty: host candidates only)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Label of the placeholder data channel the server expects (default: "data")
    pub data_channel_label: String,

    /// Upper bound on the ICE gathering wait; `None` waits indefinitely
    pub ice_gathering_timeout_ms: Option<u64>,

    /// Upper bound on the signaling HTTP round trip; `None` waits indefinitely
    pub request_timeout_ms: Option<u64>,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            stun_servers: Vec::new(),
            turn_servers: Vec::new(),
            data_channel_label: "data".to_string(),
            ice_gathering_timeout_ms: Some(10_000),
            request_timeout_ms: Some(30_000),
        }
    }
}

impl ClientConfig {
    /// Create a config for `server_url` with every other field defaulted
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Build a config from `VOICE_AGENT_*` environment variables over the defaults
    ///
    /// `VOICE_AGENT_ICE_GATHERING_TIMEOUT_MS=0` disables the gathering timeout.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("VOICE_AGENT_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(servers) = std::env::var("VOICE_AGENT_STUN_SERVERS") {
            config.stun_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(ms) = std::env::var("VOICE_AGENT_ICE_GATHERING_TIMEOUT_MS") {
            config.ice_gathering_timeout_ms =
                parse_timeout("VOICE_AGENT_ICE_GATHERING_TIMEOUT_MS", &ms)?;
        }
        if let Ok(ms) = std::env::var("VOICE_AGENT_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_timeout("VOICE_AGENT_REQUEST_TIMEOUT_MS", &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Full URL of the offer endpoint
    pub fn offer_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), OFFER_PATH)
    }

    /// ICE gathering bound as a `Duration`
    pub fn ice_gathering_timeout(&self) -> Option<Duration> {
        self.ice_gathering_timeout_ms.map(Duration::from_millis)
    }

    /// Signaling round-trip bound as a `Duration`
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `server_url` is empty or not an http(s) URL
    /// - a STUN or TURN URL has the wrong scheme
    /// - `data_channel_label` is empty
    /// - a configured timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(Error::InvalidConfig(
                "server_url cannot be empty".to_string(),
            ));
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "server_url must start with http:// or https://, got {}",
                self.server_url
            )));
        }

        for url in &self.stun_servers {
            if !url.starts_with("stun:") && !url.starts_with("stuns:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN server must start with stun: or stuns:, got {}",
                    url
                )));
            }
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
        }

        if self.data_channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "data_channel_label cannot be empty".to_string(),
            ));
        }

        if self.ice_gathering_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "ice_gathering_timeout_ms must be positive (use None to wait indefinitely)"
                    .to_string(),
            ));
        }

        if self.request_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be positive (use None to wait indefinitely)".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_timeout(var: &str, value: &str) -> Result<Option<u64>> {
    let ms: u64 = value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{} must be an integer: {}", var, e)))?;
    Ok((ms > 0).then_some(ms))
}
