//! Configuration types for the signaling handshake

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Relay endpoint used when nothing else is configured
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8891/ws";

/// Main configuration for one handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// WebSocket relay URL (ws:// or wss://)
    pub relay_url: String,

    /// STUN server URLs (may be empty for LAN-only operation)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// When the local description is sent relative to candidate gathering
    pub gathering: GatheringPolicy,

    /// Bound on waiting for the remote description, in seconds (0 = wait
    /// indefinitely)
    pub handshake_timeout_secs: u64,

    /// Label of a data channel negotiated with the connection (None = no
    /// application channel)
    pub data_channel_label: Option<String>,
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Candidate gathering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatheringPolicy {
    /// Send the description immediately and trickle candidates as they are
    /// discovered. Candidates may reach the peer before or after the
    /// description.
    #[default]
    Trickle,
    /// Wait for gathering to finish and send a description that already
    /// embeds every local candidate. No `Candidate` messages are sent.
    Complete,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            gathering: GatheringPolicy::Trickle,
            handshake_timeout_secs: 30,
            data_channel_label: Some("handshake".to_string()),
        }
    }
}

impl HandshakeConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `relay_url` is not a WebSocket URL
    /// - a STUN URL does not use the `stun:`/`stuns:` scheme
    /// - a TURN URL does not use the `turn:`/`turns:` scheme or has no username
    /// - `data_channel_label` is an empty string
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.relay_url.starts_with("ws://") && !self.relay_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "relay_url must start with ws:// or wss://, got {}",
                self.relay_url
            )));
        }

        if let Some(url) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server must start with stun: or stuns:, got {}",
                url
            )));
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server must start with turn: or turns:, got {}",
                    turn.url
                )));
            }
            if turn.username.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "TURN server {} requires a username",
                    turn.url
                )));
            }
        }

        if matches!(&self.data_channel_label, Some(label) if label.is_empty()) {
            return Err(Error::InvalidConfig(
                "data_channel_label must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Bound on waiting for the remote description, if any
    pub fn handshake_timeout(&self) -> Option<Duration> {
        match self.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Configuration for two peers on the same host: loopback relay, no
    /// STUN servers, short timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use handshake_signaling::config::HandshakeConfig;
    ///
    /// let config = HandshakeConfig::local_preset();
    /// assert!(config.stun_servers.is_empty());
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn local_preset() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            stun_servers: Vec::new(),
            turn_servers: Vec::new(),
            gathering: GatheringPolicy::Trickle,
            handshake_timeout_secs: 10,
            data_channel_label: Some("handshake".to_string()),
        }
    }

    /// Set the relay URL
    pub fn with_relay_url(mut self, relay_url: &str) -> Self {
        self.relay_url = relay_url.to_string();
        self
    }

    /// Add TURN servers to this configuration
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the gathering policy
    pub fn with_gathering(mut self, gathering: GatheringPolicy) -> Self {
        self.gathering = gathering;
        self
    }

    /// Set the handshake timeout in seconds (0 = wait indefinitely)
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.handshake_timeout_secs = secs;
        self
    }
}
