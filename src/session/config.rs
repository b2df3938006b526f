//! Session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCode, ErrorDomain, Result};

/// Maximum number of custom TURN servers in an [`IceConfig`]
pub const MAX_TURN_SERVERS: usize = 5;

/// Which TURN servers the transport may use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceIncludeServers {
    /// Platform servers plus any custom ones
    #[default]
    All,
    /// Custom servers only
    Custom,
}

/// How the transport may reach the media server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceTransportPolicy {
    /// Direct connectivity, TURN as fallback
    #[default]
    All,
    /// Always relay through TURN
    Relay,
}

/// A custom TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}

/// NAT traversal configuration handed to the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceConfig {
    #[serde(default)]
    pub include_servers: IceIncludeServers,

    #[serde(default)]
    pub transport_policy: IceTransportPolicy,

    #[serde(default)]
    custom_servers: Vec<IceServer>,
}

impl IceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom TURN servers in the order they were added
    pub fn custom_servers(&self) -> &[IceServer] {
        &self.custom_servers
    }

    /// Add a custom TURN server.
    ///
    /// Fails without modifying the list if the url is not a `turn:`/`turns:`
    /// url with a host, if the username or credential is empty, or if
    /// [`MAX_TURN_SERVERS`] entries are already present.
    pub fn add_ice_server(
        &mut self,
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<()> {
        let server = IceServer {
            url: url.into(),
            username: username.into(),
            credential: credential.into(),
        };

        validate_turn_url(&server.url)?;
        if server.username.is_empty() || server.credential.is_empty() {
            return Err(Error::validation(
                ErrorDomain::Session,
                ErrorCode::InvalidIceServer,
                "TURN username and credential must not be empty",
            ));
        }
        if self.custom_servers.len() >= MAX_TURN_SERVERS {
            return Err(Error::capacity(
                ErrorDomain::Session,
                ErrorCode::IceServerLimitReached,
                format!("at most {} custom TURN servers", MAX_TURN_SERVERS),
            ));
        }

        self.custom_servers.push(server);
        Ok(())
    }

    pub fn include_servers(mut self, include: IceIncludeServers) -> Self {
        self.include_servers = include;
        self
    }

    pub fn transport_policy(mut self, policy: IceTransportPolicy) -> Self {
        self.transport_policy = policy;
        self
    }
}

fn validate_turn_url(url: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::validation(
            ErrorDomain::Session,
            ErrorCode::InvalidIceServer,
            format!("invalid TURN url {:?}: {}", url, reason),
        ))
    };

    let rest = match url.split_once(':') {
        Some(("turn", rest)) | Some(("turns", rest)) => rest,
        _ => return invalid("scheme must be turn: or turns:"),
    };

    // turn:host[:port][?transport=udp|tcp]
    let authority = rest.split('?').next().unwrap_or_default();
    let host = authority.rsplit_once(':').map_or(authority, |(h, _)| h);
    if host.is_empty() {
        return invalid("missing host");
    }
    if url.chars().any(char::is_whitespace) {
        return invalid("contains whitespace");
    }
    if let Some((_, port)) = authority.rsplit_once(':') {
        if port.parse::<u16>().is_err() {
            return invalid("port is not a number");
        }
    }

    Ok(())
}

/// Bounded retry policy for automatic reconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Attempts before the session gives up and tears down (0 = never retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first attempt, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for the exponential backoff, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based), doubling each time
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.initial_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Session configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Skip connection created/destroyed notifications
    #[serde(default)]
    pub connection_events_suppressed: bool,

    #[serde(default)]
    pub ice_config: IceConfig,

    /// Override for the signaling API endpoint
    #[serde(default)]
    pub api_url: Option<String>,

    /// Proxy endpoint for signaling traffic
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// The project uses an IP allow-list
    #[serde(default)]
    pub ip_whitelist: bool,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Signals that may be queued during one reconnection episode
    #[serde(default = "default_signal_queue_capacity")]
    pub signal_queue_capacity: usize,
}

fn default_signal_queue_capacity() -> usize {
    1024
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connection_events_suppressed: false,
            ice_config: IceConfig::default(),
            api_url: None,
            proxy_url: None,
            ip_whitelist: false,
            reconnect: ReconnectPolicy::default(),
            signal_queue_capacity: default_signal_queue_capacity(),
        }
    }
}

impl SessionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress connection created/destroyed notifications
    pub fn suppress_connection_events(mut self) -> Self {
        self.connection_events_suppressed = true;
        self
    }

    pub fn ice_config(mut self, config: IceConfig) -> Self {
        self.ice_config = config;
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn ip_whitelist(mut self, enabled: bool) -> Self {
        self.ip_whitelist = enabled;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    pub fn signal_queue_capacity(mut self, capacity: usize) -> Self {
        self.signal_queue_capacity = capacity;
        self
    }
}

/// Identity of the session plus its settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub api_key: String,
    pub session_id: String,
    pub settings: SessionSettings,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            session_id: session_id.into(),
            settings: SessionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }
}
