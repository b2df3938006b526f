//! Observer context
//!
//! Context passed to every observer callback, carrying a read-only view of
//! the session at the moment the notification was raised.

use crate::registry::Connection;

use super::state::SessionStatus;

/// What the token used to connect allows this client to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_publish: bool,
    pub can_subscribe: bool,
}

impl Capabilities {
    /// Publisher role: publish and subscribe
    pub fn publisher() -> Self {
        Self {
            can_publish: true,
            can_subscribe: true,
        }
    }

    /// Subscriber role: subscribe only
    pub fn subscriber() -> Self {
        Self {
            can_publish: false,
            can_subscribe: true,
        }
    }
}

/// Context passed to observer callbacks
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub api_key: String,

    pub session_id: String,

    /// Status at the time of the notification
    pub status: SessionStatus,

    /// Local connection, once connected
    pub local_connection: Option<Connection>,

    /// Granted capabilities, once connected
    pub capabilities: Option<Capabilities>,
}

impl SessionContext {
    pub fn new(api_key: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            session_id: session_id.into(),
            status: SessionStatus::NotConnected,
            local_connection: None,
            capabilities: None,
        }
    }

    /// Id of the local connection if available
    pub fn connection_id(&self) -> Option<&str> {
        self.local_connection.as_ref().map(|c| c.id.as_str())
    }

    pub fn can_publish(&self) -> bool {
        self.capabilities.is_some_and(|c| c.can_publish)
    }

    pub fn can_subscribe(&self) -> bool {
        self.capabilities.is_some_and(|c| c.can_subscribe)
    }
}
