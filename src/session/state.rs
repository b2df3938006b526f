//! Session state machine
//!
//! Tracks the connection status of a session from construction to teardown
//! and rejects transitions the lifecycle does not allow.

use std::fmt;
use std::time::Instant;

/// Session connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Initial state, and the state after every teardown
    NotConnected,
    /// Connect requested, waiting for the transport
    Connecting,
    /// Connected; publish, subscribe and signal are available
    Connected,
    /// Network lost; bindings preserved while the transport retries
    Reconnecting,
    /// Releasing resources on the way to `NotConnected`
    Disconnecting,
    /// Unrecoverable fault; terminal
    Failed,
}

impl SessionStatus {
    /// Whether publish/subscribe and their inverses are permitted
    pub fn allows_media(&self) -> bool {
        matches!(self, SessionStatus::Connected | SessionStatus::Reconnecting)
    }

    /// Whether `disconnect` is permitted
    pub fn allows_disconnect(&self) -> bool {
        matches!(
            self,
            SessionStatus::Connecting | SessionStatus::Connected | SessionStatus::Reconnecting
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == SessionStatus::Failed
    }

    /// Whether the lifecycle permits moving from `self` to `to`
    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;

        match (*self, to) {
            (Failed, _) => false,
            (_, Failed) => true,
            (NotConnected, Connecting) => true,
            (Connecting, Connected) | (Connecting, NotConnected) | (Connecting, Disconnecting) => {
                true
            }
            (Connected, Reconnecting) | (Connected, Disconnecting) | (Connected, NotConnected) => {
                true
            }
            (Reconnecting, Connected)
            | (Reconnecting, Disconnecting)
            | (Reconnecting, NotConnected) => true,
            (Disconnecting, NotConnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::NotConnected => "not-connected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Reconnecting => "reconnecting",
            SessionStatus::Disconnecting => "disconnecting",
            SessionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A transition the lifecycle does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Connection lifecycle state
#[derive(Debug)]
pub struct SessionState {
    status: SessionStatus,

    /// When the current connection was established
    connected_at: Option<Instant>,

    /// When the current reconnection episode began
    reconnecting_since: Option<Instant>,

    /// Attempts made in the current reconnection episode
    reconnect_attempts: u32,

    /// Incremented on every successful connect; tags one connection's lifetime
    epoch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::NotConnected,
            connected_at: None,
            reconnecting_since: None,
            reconnect_attempts: 0,
            epoch: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Move to `to`, returning the previous status
    pub fn transition(&mut self, to: SessionStatus) -> Result<SessionStatus, InvalidTransition> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }

        match to {
            SessionStatus::Connected if from == SessionStatus::Connecting => {
                self.connected_at = Some(Instant::now());
                self.epoch += 1;
            }
            SessionStatus::Reconnecting => {
                self.reconnecting_since = Some(Instant::now());
                self.reconnect_attempts = 0;
            }
            SessionStatus::NotConnected | SessionStatus::Failed => {
                self.connected_at = None;
            }
            _ => {}
        }
        if to != SessionStatus::Reconnecting {
            self.reconnecting_since = None;
        }

        self.status = to;
        tracing::debug!(from = %from, to = %to, "Session transition");
        Ok(from)
    }

    /// Record one more reconnection attempt, returning the new count
    pub fn record_reconnect_attempt(&mut self) -> u32 {
        self.reconnect_attempts += 1;
        self.reconnect_attempts
    }

    /// How long the current connection has been up
    pub fn connected_for(&self) -> Option<std::time::Duration> {
        self.connected_at.map(|t| t.elapsed())
    }

    /// How long the current reconnection episode has lasted
    pub fn reconnecting_for(&self) -> Option<std::time::Duration> {
        self.reconnecting_since.map(|t| t.elapsed())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
