//! Signal messages and their validation rules

use crate::error::{Error, ErrorCode, ErrorDomain, Result};
use crate::registry::ConnectionId;

/// Maximum length of a signal type, in characters
pub const MAX_SIGNAL_TYPE_LEN: usize = 128;

/// Maximum size of a signal payload, in bytes
pub const MAX_SIGNAL_PAYLOAD_BYTES: usize = 8 * 1024;

/// An outgoing signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub kind: String,
    pub payload: String,
    /// Recipient connection; `None` broadcasts to every connection
    pub target: Option<ConnectionId>,
    /// Queue the signal if the session is reconnecting
    pub retry_after_reconnect: bool,
}

impl Signal {
    /// Broadcast signal that is retried after a reconnect
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
            target: None,
            retry_after_reconnect: true,
        }
    }

    /// Address the signal to a single connection
    pub fn to(mut self, connection: impl Into<ConnectionId>) -> Self {
        self.target = Some(connection.into());
        self
    }

    pub fn retry_after_reconnect(mut self, retry: bool) -> Self {
        self.retry_after_reconnect = retry;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }

    /// Check type and payload against the size and charset rules
    pub fn validate(&self) -> Result<()> {
        validate_type(&self.kind)?;
        validate_payload(&self.payload)
    }
}

/// A signal received from the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedSignal {
    pub kind: Option<String>,
    pub payload: Option<String>,
    /// Sender, when the transport could attribute it
    pub from: Option<ConnectionId>,
}

fn is_type_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '~' | '-')
}

/// Type must be 1-128 characters from `[A-Za-z0-9_~-]`
pub fn validate_type(kind: &str) -> Result<()> {
    if kind.is_empty() || kind.len() > MAX_SIGNAL_TYPE_LEN {
        return Err(Error::validation(
            ErrorDomain::Session,
            ErrorCode::InvalidSignalType,
            format!(
                "signal type must be 1-{} characters, got {}",
                MAX_SIGNAL_TYPE_LEN,
                kind.chars().count()
            ),
        ));
    }
    if let Some(bad) = kind.chars().find(|c| !is_type_char(*c)) {
        return Err(Error::validation(
            ErrorDomain::Session,
            ErrorCode::InvalidSignalType,
            format!("signal type contains invalid character {:?}", bad),
        ));
    }
    Ok(())
}

/// Payload must be at most 8KB of UTF-8
pub fn validate_payload(payload: &str) -> Result<()> {
    if payload.len() > MAX_SIGNAL_PAYLOAD_BYTES {
        return Err(Error::validation(
            ErrorDomain::Session,
            ErrorCode::SignalPayloadTooLarge,
            format!(
                "signal payload is {} bytes, limit is {}",
                payload.len(),
                MAX_SIGNAL_PAYLOAD_BYTES
            ),
        ));
    }
    Ok(())
}
