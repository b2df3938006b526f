//! Observer traits
//!
//! Applications register observers to receive notifications raised on the
//! session context. Every method has an empty default body, so an observer
//! only implements the callbacks it cares about and the rest are skipped.
//!
//! All callbacks for one session are delivered in a single total order.
//! Implementations must not block; hand heavy work off to another task.

use crate::error::Error;
use crate::media::VideoDimensions;
use crate::registry::{Connection, PublisherId, Stream, StreamId, StreamProperty, SubscriberId};
use crate::session::SessionContext;
use crate::signal::ReceivedSignal;
use crate::stats::{PublisherNetworkStats, SubscriberNetworkStats};

/// Why a subscriber's video was enabled or disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEventReason {
    /// The publisher stopped (or resumed) publishing video
    PublisherPropertyChanged,
    /// The application changed `subscribe_to_video`
    SubscriberPropertyChanged,
    /// Audio-fallback reacted to network quality
    QualityChanged,
    /// The subscriber cannot decode the stream's codec
    CodecNotSupported,
}

/// Session-level notifications
#[allow(unused_variables)]
pub trait SessionObserver: Send + Sync {
    fn on_connected(&self, ctx: &SessionContext) {}

    fn on_disconnected(&self, ctx: &SessionContext) {}

    /// Network lost; the session is retrying and bindings are preserved
    fn on_reconnecting(&self, ctx: &SessionContext) {}

    fn on_reconnected(&self, ctx: &SessionContext) {}

    /// Asynchronous transport or fatal error
    fn on_error(&self, ctx: &SessionContext, error: &Error) {}

    /// A remote participant joined (not raised when connection events are suppressed)
    fn on_connection_created(&self, ctx: &SessionContext, connection: &Connection) {}

    /// A remote participant left
    fn on_connection_destroyed(&self, ctx: &SessionContext, connection: &Connection) {}

    /// A remote stream became available
    fn on_stream_created(&self, ctx: &SessionContext, stream: &Stream) {}

    /// A remote stream went away
    fn on_stream_destroyed(&self, ctx: &SessionContext, stream: &Stream) {}

    fn on_stream_property_changed(
        &self,
        ctx: &SessionContext,
        stream: &Stream,
        change: StreamProperty,
    ) {
    }

    fn on_signal_received(&self, ctx: &SessionContext, signal: &ReceivedSignal) {}

    fn on_archive_started(&self, ctx: &SessionContext, archive_id: &str, name: Option<&str>) {}

    fn on_archive_stopped(&self, ctx: &SessionContext, archive_id: &str) {}
}

/// Notifications for one local publisher
#[allow(unused_variables)]
pub trait PublisherObserver: Send + Sync {
    /// Publishing started; the stream is now registered
    fn on_stream_created(&self, ctx: &SessionContext, publisher: PublisherId, stream: &Stream) {}

    /// Publishing stopped; the stream is no longer registered
    fn on_stream_destroyed(&self, ctx: &SessionContext, publisher: PublisherId, stream: &Stream) {}

    fn on_error(&self, ctx: &SessionContext, publisher: PublisherId, error: &Error) {}

    /// Microphone level, 0.0 to 1.0
    fn on_audio_level(&self, ctx: &SessionContext, publisher: PublisherId, level: f32) {}

    /// Audio-fallback disabled (`false`) or restored (`true`) outgoing video
    fn on_video_fallback_changed(
        &self,
        ctx: &SessionContext,
        publisher: PublisherId,
        video_enabled: bool,
    ) {
    }

    /// One sample per subscribing connection
    fn on_network_stats(
        &self,
        ctx: &SessionContext,
        publisher: PublisherId,
        stats: &[PublisherNetworkStats],
    ) {
    }
}

/// Notifications for one subscriber
#[allow(unused_variables)]
pub trait SubscriberObserver: Send + Sync {
    fn on_connected(&self, ctx: &SessionContext, subscriber: SubscriberId) {}

    /// Media flow interrupted; the subscriber may recover
    fn on_disconnected(&self, ctx: &SessionContext, subscriber: SubscriberId) {}

    fn on_reconnected(&self, ctx: &SessionContext, subscriber: SubscriberId) {}

    fn on_error(&self, ctx: &SessionContext, subscriber: SubscriberId, error: &Error) {}

    fn on_video_disabled(
        &self,
        ctx: &SessionContext,
        subscriber: SubscriberId,
        reason: VideoEventReason,
    ) {
    }

    fn on_video_enabled(
        &self,
        ctx: &SessionContext,
        subscriber: SubscriberId,
        reason: VideoEventReason,
    ) {
    }

    /// Advisory: quality is degrading and video may be disabled soon
    fn on_video_disable_warning(&self, ctx: &SessionContext, subscriber: SubscriberId) {}

    fn on_video_disable_warning_lifted(&self, ctx: &SessionContext, subscriber: SubscriberId) {}

    /// First frame decoded (and again after each video interruption)
    fn on_video_data_received(
        &self,
        ctx: &SessionContext,
        subscriber: SubscriberId,
        dimensions: Option<VideoDimensions>,
    ) {
    }

    fn on_audio_level(&self, ctx: &SessionContext, subscriber: SubscriberId, level: f32) {}

    fn on_network_stats(
        &self,
        ctx: &SessionContext,
        subscriber: SubscriberId,
        stats: &SubscriberNetworkStats,
    ) {
    }

    /// Terminal: unsubscribed, stream removed or session torn down
    fn on_destroyed(&self, ctx: &SessionContext, subscriber: SubscriberId, stream: &StreamId) {}
}
