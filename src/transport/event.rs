//! Events the transport raises back into the session

use std::fmt;

use crate::error::{Error, ErrorCode, ErrorDomain};
use crate::media::VideoDimensions;
use crate::observer::VideoEventReason;
use crate::registry::{Connection, ConnectionId, PublisherId, Stream, StreamId, StreamProperty, SubscriberId};
use crate::session::Capabilities;
use crate::signal::ReceivedSignal;
use crate::stats::{PublisherNetworkStats, SubscriberNetworkStats};

/// Tag for one asynchronous request issued to the transport.
///
/// Completions carry the tag back; a completion whose tag is no longer the
/// one the session is waiting for belongs to a superseded request and is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Failure reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Transport-specific code, passed through for diagnostics
    pub code: i32,
    pub message: String,
}

impl TransportFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Surface as an asynchronous transport error
    pub fn into_error(self, domain: ErrorDomain, code: ErrorCode) -> Error {
        Error::transport(domain, code, format!("{} (transport code {})", self.message, self.code))
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Source of an audio level sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEndpoint {
    Publisher(PublisherId),
    Subscriber(SubscriberId),
}

/// Everything that re-enters the session from the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connect completed; carries the grant parsed from the token
    Connected {
        op: OperationId,
        connection: Connection,
        capabilities: Capabilities,
    },
    ConnectFailed {
        op: OperationId,
        failure: TransportFailure,
    },

    /// Connectivity dropped while connected
    NetworkLost,
    ReconnectSucceeded {
        op: OperationId,
    },
    ReconnectAttemptFailed {
        op: OperationId,
        failure: TransportFailure,
    },

    /// Server-initiated disconnect
    Disconnected {
        failure: Option<TransportFailure>,
    },

    /// Unrecoverable fault
    Fatal {
        failure: TransportFailure,
    },

    ConnectionCreated(Connection),
    ConnectionDestroyed(ConnectionId),

    StreamCreated(Stream),
    StreamDestroyed(StreamId),
    StreamPropertyChanged {
        stream: StreamId,
        change: StreamProperty,
    },

    PublishSucceeded {
        op: OperationId,
        publisher: PublisherId,
        /// Id the transport assigned to the new stream. `None` lets the
        /// session allocate a local `strN` id.
        stream: Option<StreamId>,
        video_dimensions: Option<VideoDimensions>,
    },
    PublishFailed {
        op: OperationId,
        publisher: PublisherId,
        failure: TransportFailure,
    },

    /// Audio-fallback toggled outgoing video
    PublisherVideoFallback {
        publisher: PublisherId,
        video_enabled: bool,
    },

    SubscribeSucceeded {
        op: OperationId,
        subscriber: SubscriberId,
    },
    SubscribeFailed {
        op: OperationId,
        subscriber: SubscriberId,
        failure: TransportFailure,
    },
    SubscriberMediaDisconnected(SubscriberId),
    SubscriberMediaReconnected(SubscriberId),
    SubscriberVideoChanged {
        subscriber: SubscriberId,
        enabled: bool,
        reason: VideoEventReason,
    },
    VideoDisableWarning {
        subscriber: SubscriberId,
        lifted: bool,
    },
    VideoDataReceived {
        subscriber: SubscriberId,
        dimensions: Option<VideoDimensions>,
    },

    SignalReceived(ReceivedSignal),

    ArchiveStarted {
        archive_id: String,
        name: Option<String>,
    },
    ArchiveStopped {
        archive_id: String,
    },

    AudioLevel {
        endpoint: MediaEndpoint,
        level: f32,
    },
    PublisherStats {
        publisher: PublisherId,
        samples: Vec<PublisherNetworkStats>,
    },
    SubscriberStats {
        subscriber: SubscriberId,
        sample: SubscriberNetworkStats,
    },
}

impl TransportEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connected { .. } => "connected",
            TransportEvent::ConnectFailed { .. } => "connect-failed",
            TransportEvent::NetworkLost => "network-lost",
            TransportEvent::ReconnectSucceeded { .. } => "reconnect-succeeded",
            TransportEvent::ReconnectAttemptFailed { .. } => "reconnect-attempt-failed",
            TransportEvent::Disconnected { .. } => "disconnected",
            TransportEvent::Fatal { .. } => "fatal",
            TransportEvent::ConnectionCreated(_) => "connection-created",
            TransportEvent::ConnectionDestroyed(_) => "connection-destroyed",
            TransportEvent::StreamCreated(_) => "stream-created",
            TransportEvent::StreamDestroyed(_) => "stream-destroyed",
            TransportEvent::StreamPropertyChanged { .. } => "stream-property-changed",
            TransportEvent::PublishSucceeded { .. } => "publish-succeeded",
            TransportEvent::PublishFailed { .. } => "publish-failed",
            TransportEvent::PublisherVideoFallback { .. } => "publisher-video-fallback",
            TransportEvent::SubscribeSucceeded { .. } => "subscribe-succeeded",
            TransportEvent::SubscribeFailed { .. } => "subscribe-failed",
            TransportEvent::SubscriberMediaDisconnected(_) => "subscriber-media-disconnected",
            TransportEvent::SubscriberMediaReconnected(_) => "subscriber-media-reconnected",
            TransportEvent::SubscriberVideoChanged { .. } => "subscriber-video-changed",
            TransportEvent::VideoDisableWarning { .. } => "video-disable-warning",
            TransportEvent::VideoDataReceived { .. } => "video-data-received",
            TransportEvent::SignalReceived(_) => "signal-received",
            TransportEvent::ArchiveStarted { .. } => "archive-started",
            TransportEvent::ArchiveStopped { .. } => "archive-stopped",
            TransportEvent::AudioLevel { .. } => "audio-level",
            TransportEvent::PublisherStats { .. } => "publisher-stats",
            TransportEvent::SubscriberStats { .. } => "subscriber-stats",
        }
    }
}
