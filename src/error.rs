//! Error types
//!
//! Every error carries a coarse [`ErrorDomain`], the [`ErrorKind`] that says
//! how it was delivered and what it did to state, and a stable [`ErrorCode`].
//!
//! Validation, capacity, state and binding errors are returned synchronously
//! and never mutate anything. Transport and fatal errors are only ever
//! delivered to an observer's `on_error` on the session context.

use std::fmt;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Which entity an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    Session,
    Publisher,
    Subscriber,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Session => write!(f, "session"),
            ErrorDomain::Publisher => write!(f, "publisher"),
            ErrorDomain::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input (signal type/payload, TURN url/credentials, frame metadata)
    Validation,
    /// A bounded resource is already full
    Capacity,
    /// Operation not valid for the current lifecycle state
    State,
    /// Subscriber could not be bound to the requested stream
    InvalidStream,
    /// Network-originated failure
    Transport,
    /// Unrecoverable failure; the session is now `Failed`
    Fatal,
}

impl ErrorKind {
    /// Whether errors of this kind are reported from the call itself
    pub fn is_synchronous(&self) -> bool {
        !matches!(self, ErrorKind::Transport | ErrorKind::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Capacity => "capacity",
            ErrorKind::State => "state",
            ErrorKind::InvalidStream => "invalid stream",
            ErrorKind::Transport => "transport",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Stable error codes
///
/// The integer values are part of the public contract and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    // Session
    InvalidSessionState = 1001,
    NotConnected = 1002,
    SessionClosed = 1003,
    InvalidSignalType = 1101,
    SignalPayloadTooLarge = 1102,
    InvalidSignalTarget = 1103,
    SignalQueueFull = 1104,
    InvalidIceServer = 1201,
    IceServerLimitReached = 1202,
    ConnectFailed = 1301,
    ReconnectFailed = 1302,
    ConnectionDropped = 1303,
    SessionFatal = 1500,

    // Publisher
    PublisherAlreadyActive = 2001,
    PublishNotPermitted = 2002,
    PublisherStopped = 2003,
    PublisherNotPublishing = 2004,
    UnknownPublisher = 2005,
    FrameMetadataTooLarge = 2006,
    PublishFailed = 2101,

    // Subscriber
    StreamNotFound = 3001,
    SubscriberDestroyed = 3002,
    SubscribeNotPermitted = 3003,
    UnknownSubscriber = 3004,
    SubscriberAlreadyBound = 3005,
    SubscribeFailed = 3101,
}

impl ErrorCode {
    /// Integer value of the code
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self, self.as_i32())
    }
}

/// Error surfaced by the session core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{domain} {kind} error ({code}): {message}")]
pub struct Error {
    pub domain: ErrorDomain,
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(
        domain: ErrorDomain,
        kind: ErrorKind,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn validation(domain: ErrorDomain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(domain, ErrorKind::Validation, code, message)
    }

    pub fn capacity(domain: ErrorDomain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(domain, ErrorKind::Capacity, code, message)
    }

    pub fn state(domain: ErrorDomain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(domain, ErrorKind::State, code, message)
    }

    pub fn invalid_stream(message: impl Into<String>) -> Self {
        Self::new(
            ErrorDomain::Subscriber,
            ErrorKind::InvalidStream,
            ErrorCode::StreamNotFound,
            message,
        )
    }

    pub fn transport(domain: ErrorDomain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(domain, ErrorKind::Transport, code, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(
            ErrorDomain::Session,
            ErrorKind::Fatal,
            ErrorCode::SessionFatal,
            message,
        )
    }

    /// Check the error kind
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_domain_kind_and_code() {
        let err = Error::capacity(
            ErrorDomain::Publisher,
            ErrorCode::PublisherAlreadyActive,
            "a publisher is already active",
        );
        let text = err.to_string();

        assert!(text.starts_with("publisher capacity error"));
        assert!(text.contains("2001"));
        assert!(text.ends_with("a publisher is already active"));
    }

    #[test]
    fn test_synchronous_kinds() {
        assert!(ErrorKind::Validation.is_synchronous());
        assert!(ErrorKind::Capacity.is_synchronous());
        assert!(ErrorKind::State.is_synchronous());
        assert!(ErrorKind::InvalidStream.is_synchronous());
        assert!(!ErrorKind::Transport.is_synchronous());
        assert!(!ErrorKind::Fatal.is_synchronous());
    }

    #[test]
    fn test_invalid_stream_is_subscriber_domain() {
        let err = Error::invalid_stream("no such stream");
        assert_eq!(err.domain, ErrorDomain::Subscriber);
        assert_eq!(err.code, ErrorCode::StreamNotFound);
        assert!(err.is(ErrorKind::InvalidStream));
    }
}
